//! Content-type sniffing for the supported image formats.
//!
//! Detection looks at magic bytes only, never at the client-supplied
//! filename or Content-Type header. Anything outside the supported set is
//! rejected at [`ImageFile`](crate::ImageFile) creation.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How many leading bytes the sniffer inspects.
pub const SNIFF_LEN: usize = 512;

/// The supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageKind {
    /// Detect the format from the leading bytes of a file.
    pub fn sniff(head: &[u8]) -> Result<ImageKind, AppError> {
        if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Ok(ImageKind::Jpeg);
        }
        if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Ok(ImageKind::Png);
        }
        if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
            return Ok(ImageKind::Gif);
        }
        if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
            return Ok(ImageKind::Webp);
        }
        Err(AppError::UnsupportedMime)
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
            ImageKind::Webp => "image/webp",
        }
    }

    /// Format token understood by the GraphicsMagick `convert` output
    /// specifier (`JPEG:outfile` etc).
    pub fn gm_token(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "JPEG",
            ImageKind::Png => "PNG",
            ImageKind::Gif => "GIF",
            ImageKind::Webp => "WEBP",
        }
    }

    /// Parse a user-supplied format name ("jpg", "webp", ...). Empty input
    /// means "inherit from the source".
    pub fn from_format_str(s: &str) -> Option<ImageKind> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "gif" => Some(ImageKind::Gif),
            "webp" => Some(ImageKind::Webp),
            _ => None,
        }
    }

    pub fn is_jpeg(&self) -> bool {
        matches!(self, ImageKind::Jpeg)
    }

    pub fn is_png(&self) -> bool {
        matches!(self, ImageKind::Png)
    }

    pub fn is_gif(&self) -> bool {
        matches!(self, ImageKind::Gif)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00,
    ];

    #[test]
    fn sniffs_supported_formats() {
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap(), ImageKind::Jpeg);
        assert_eq!(
            ImageKind::sniff(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00]).unwrap(),
            ImageKind::Png
        );
        assert_eq!(ImageKind::sniff(GIF_1X1).unwrap(), ImageKind::Gif);
        assert_eq!(
            ImageKind::sniff(b"RIFF\x24\x00\x00\x00WEBPVP8 ").unwrap(),
            ImageKind::Webp
        );
    }

    #[test]
    fn rejects_unknown_content() {
        assert!(matches!(
            ImageKind::sniff(b"%PDF-1.4"),
            Err(AppError::UnsupportedMime)
        ));
        assert!(matches!(ImageKind::sniff(b""), Err(AppError::UnsupportedMime)));
        // RIFF container that is not WEBP (e.g. WAV audio)
        assert!(matches!(
            ImageKind::sniff(b"RIFF\x24\x00\x00\x00WAVEfmt "),
            Err(AppError::UnsupportedMime)
        ));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!(ImageKind::from_format_str("jpg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_format_str("JPEG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_format_str("webp"), Some(ImageKind::Webp));
        assert_eq!(ImageKind::from_format_str("tiff"), None);
        assert_eq!(ImageKind::from_format_str(""), None);
    }
}
