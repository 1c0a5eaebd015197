//! Thumbnail requests.
//!
//! A [`ThumbSpec`] is the declarative description of one derived image the
//! caller wants produced. Geometry is resolved against the original's
//! dimensions: `max_width`/`max_height` clamp, `crop_ratio` derives a crop
//! box, and anything that resolves to 0 or above [`MAX_IMAGE_SIDE`] is
//! rejected before a single external command runs.

use std::path::PathBuf;

use serde::{de, Deserialize, Deserializer};

use crate::error::AppError;
use crate::mime::ImageKind;

pub const DEFAULT_QUALITY: u32 = 83;
pub const MAX_IMAGE_SIDE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbShape {
    Square,
    Circle,
    Thumb,
    Custom,
    Full,
}

impl ThumbShape {
    /// Unknown or empty shape names fall back to `Full`, which only
    /// transcodes.
    pub fn parse(s: &str) -> ThumbShape {
        match s {
            "square" => ThumbShape::Square,
            "circle" => ThumbShape::Circle,
            "thumb" => ThumbShape::Thumb,
            "custom" => ThumbShape::Custom,
            _ => ThumbShape::Full,
        }
    }
}

/// One requested thumbnail.
#[derive(Debug, Clone)]
pub struct ThumbSpec {
    pub name: String,
    pub width: u32,
    pub max_width: u32,
    pub height: u32,
    pub max_height: u32,
    pub shape: ThumbShape,
    pub crop_gravity: String,
    pub crop_width: u32,
    pub crop_height: u32,
    pub crop_ratio: String,
    pub quality: u32,
    /// Requested output format; `None` inherits the source format.
    pub desired_format: Option<ImageKind>,
    pub no_store: bool,
    /// Populated by the thumbnail stage.
    pub local_path: Option<PathBuf>,
    /// Populated when the artifact is saved.
    pub store_url: Option<String>,
}

impl ThumbSpec {
    /// Output format for this thumb given the original's format.
    pub fn output_format(&self, source: ImageKind) -> ImageKind {
        self.desired_format.unwrap_or(source)
    }

    /// Effective width: `max_width`, when set, clamps against the
    /// original's width.
    pub fn compute_width(&self, original: (u32, u32)) -> u32 {
        if self.max_width > 0 {
            original.0.min(self.max_width)
        } else {
            self.width
        }
    }

    /// Effective height, clamped like [`compute_width`](Self::compute_width).
    pub fn compute_height(&self, original: (u32, u32)) -> u32 {
        if self.max_height > 0 {
            original.1.min(self.max_height)
        } else {
            self.height
        }
    }

    /// Derive a crop box from `crop_ratio` ("W:H", both floats > 0). The
    /// longer ratio side is normalised to 1 and the box is computed against
    /// the clamped dimensions.
    pub fn compute_crop(&self, original: (u32, u32)) -> Result<(u32, u32), AppError> {
        let invalid = || AppError::BadRequest("Invalid crop_ratio".to_string());

        let (w_str, h_str) = self.crop_ratio.split_once(':').ok_or_else(invalid)?;
        let w_ratio: f64 = w_str.parse().map_err(|_| invalid())?;
        let h_ratio: f64 = h_str.parse().map_err(|_| invalid())?;
        if w_ratio <= 0.0 || h_ratio <= 0.0 {
            return Err(invalid());
        }

        let (crop_w, crop_h) = if w_ratio >= h_ratio {
            let base = f64::from(self.compute_height(original));
            ((base * (w_ratio / h_ratio)).ceil(), base.ceil())
        } else {
            let base = f64::from(self.compute_width(original));
            (base.ceil(), (base * (h_ratio / w_ratio)).ceil())
        };

        Ok((crop_w as u32, crop_h as u32))
    }
}

/// Wire form of one thumb request. Dimension fields accept JSON numbers or
/// quoted strings; observed clients send both.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThumbRequest {
    #[serde(deserialize_with = "dimension")]
    width: u32,
    #[serde(deserialize_with = "dimension")]
    max_width: u32,
    #[serde(deserialize_with = "dimension")]
    height: u32,
    #[serde(deserialize_with = "dimension")]
    max_height: u32,
    shape: String,
    crop_gravity: String,
    #[serde(deserialize_with = "dimension")]
    crop_width: u32,
    #[serde(deserialize_with = "dimension")]
    crop_height: u32,
    crop_ratio: String,
    #[serde(deserialize_with = "dimension")]
    quality: u32,
    format: String,
    nostore: bool,
}

fn dimension<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u32),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) if s.is_empty() => Ok(0),
        NumberOrString::String(s) => s
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid dimension {:?}", s))),
    }
}

/// Parse the `thumbs` form field: a JSON object mapping thumb name to
/// request. Parse errors surface as a single top-level `BadRequest`.
pub fn parse_thumbs(raw: &str) -> Result<Vec<ThumbSpec>, AppError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let requests: std::collections::BTreeMap<String, ThumbRequest> =
        serde_json::from_str(raw)
            .map_err(|_| AppError::BadRequest("Error parsing thumbnail JSON!".to_string()))?;

    Ok(requests
        .into_iter()
        .map(|(name, req)| ThumbSpec {
            name,
            width: req.width,
            max_width: req.max_width,
            height: req.height,
            max_height: req.max_height,
            shape: ThumbShape::parse(&req.shape),
            crop_gravity: req.crop_gravity,
            crop_width: req.crop_width,
            crop_height: req.crop_height,
            crop_ratio: req.crop_ratio,
            quality: if req.quality == 0 {
                DEFAULT_QUALITY
            } else {
                req.quality
            },
            desired_format: ImageKind::from_format_str(&req.format),
            no_store: req.nostore,
            local_path: None,
            store_url: None,
        })
        .collect())
}
