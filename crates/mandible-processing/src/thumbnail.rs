//! Thumbnail generation.
//!
//! One stage instance per requested thumb; instances run inside the
//! pipeline's parallel group and write disjoint outputs. Geometry is
//! validated here, before any external command runs.

use async_trait::async_trait;
use mandible_core::thumbnail::MAX_IMAGE_SIDE;
use mandible_core::{ImageFile, StageOutput, ThumbShape, ThumbSpec};

use crate::command::ProcessError;
use crate::convert;
use crate::stage::ProcessStage;

pub struct ThumbnailStage {
    spec: ThumbSpec,
}

impl ThumbnailStage {
    pub fn new(spec: ThumbSpec) -> ThumbnailStage {
        ThumbnailStage { spec }
    }
}

fn check_side(value: u32, what: &str) -> Result<(), ProcessError> {
    if value == 0 {
        return Err(ProcessError::Stage(format!("{} cannot be 0", what)));
    }
    if value > MAX_IMAGE_SIDE {
        return Err(ProcessError::Stage(format!("{} too large", what)));
    }
    Ok(())
}

#[async_trait]
impl ProcessStage for ThumbnailStage {
    fn name(&self) -> &'static str {
        "thumbnail"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        let spec = &self.spec;
        let format = spec.output_format(image.mime());
        let input = image.path();

        let outfile = match spec.shape {
            ThumbShape::Square => {
                check_side(spec.width, "width")?;
                convert::square_thumb(input, &spec.name, spec.width, format).await?
            }
            ThumbShape::Circle => {
                check_side(spec.width, "width")?;
                // Build a double-size thumb, then clip it with a circular
                // alpha mask of the requested diameter.
                let enlarged = convert::thumb(
                    input,
                    &format!("{}_2x", spec.name),
                    spec.width * 2,
                    spec.width * 2,
                    format,
                )
                .await?;
                image.register_scratch(enlarged.clone());
                convert::circle_clip(&enlarged, &spec.name, spec.width, format).await?
            }
            ThumbShape::Thumb => {
                check_side(spec.width, "width")?;
                check_side(spec.height, "height")?;
                convert::thumb(input, &spec.name, spec.width, spec.height, format).await?
            }
            ThumbShape::Custom => {
                let dims = image
                    .dimensions()
                    .map_err(|e| ProcessError::Stage(e.to_string()))?;

                let (crop_width, crop_height) = if spec.crop_ratio.is_empty() {
                    (spec.crop_width, spec.crop_height)
                } else {
                    spec.compute_crop(dims)
                        .map_err(|e| ProcessError::Stage(e.to_string()))?
                };

                let width = spec.compute_width(dims);
                let height = spec.compute_height(dims);
                check_side(width, "width")?;
                check_side(height, "height")?;

                convert::custom_thumb(
                    input,
                    &spec.name,
                    width,
                    height,
                    &spec.crop_gravity,
                    crop_width,
                    crop_height,
                    spec.quality,
                    format,
                )
                .await?
            }
            ThumbShape::Full => convert::full(input, &spec.name, format).await?,
        };

        if !tokio::fs::try_exists(&outfile).await.unwrap_or(false) {
            return Err(ProcessError::Stage(format!(
                "Error when creating thumbnail {}",
                spec.name
            )));
        }

        Ok(StageOutput {
            thumb: Some((spec.name.clone(), outfile)),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandible_core::parse_thumbs;

    // 1x1 transparent GIF
    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3B,
    ];

    async fn gif_image(dir: &tempfile::TempDir, thumbs: &str) -> ImageFile {
        let path = dir.path().join("upload");
        tokio::fs::write(&path, GIF_1X1).await.unwrap();
        ImageFile::create("", path, parse_thumbs(thumbs).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn zero_dimensions_are_rejected_before_any_tool_runs() {
        let dir = tempfile::tempdir().unwrap();
        let image = gif_image(
            &dir,
            r#"{"t": {"shape": "custom", "width": 0, "height": 0}}"#,
        )
        .await;

        let stage = ThumbnailStage::new(image.thumbs()[0].clone());
        let err = stage.process(&image).await.unwrap_err();
        assert!(err.to_string().contains("cannot be 0"));
    }

    #[tokio::test]
    async fn oversized_dimensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let image = gif_image(
            &dir,
            r#"{"t": {"shape": "square", "width": 20000}}"#,
        )
        .await;

        let stage = ThumbnailStage::new(image.thumbs()[0].clone());
        let err = stage.process(&image).await.unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[tokio::test]
    async fn thumb_shape_requires_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let image = gif_image(&dir, r#"{"t": {"shape": "thumb", "width": 90}}"#).await;

        let stage = ThumbnailStage::new(image.thumbs()[0].clone());
        assert!(stage.process(&image).await.is_err());
    }
}
