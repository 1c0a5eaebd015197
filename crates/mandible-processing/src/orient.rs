//! EXIF rotation normalisation.

use async_trait::async_trait;
use mandible_core::{ImageFile, StageOutput};

use crate::command::ProcessError;
use crate::convert;
use crate::stage::ProcessStage;

/// Bakes the EXIF orientation tag into the pixel data. Only JPEG carries
/// the tag here; other formats pass through untouched rather than taking a
/// lossless-to-lossy rewrite.
pub struct ImageOrienter;

#[async_trait]
impl ProcessStage for ImageOrienter {
    fn name(&self) -> &'static str {
        "image orienter"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        if !image.mime().is_jpeg() {
            return Ok(StageOutput::default());
        }

        let outfile = convert::fix_orientation(image.path()).await?;

        Ok(StageOutput {
            path: Some(outfile),
            ..Default::default()
        })
    }
}
