//! Metadata stripping.

use async_trait::async_trait;
use mandible_core::{ImageFile, StageOutput};

use crate::command::ProcessError;
use crate::convert;
use crate::stage::ProcessStage;

/// Removes every EXIF tag from JPEG uploads in place. Non-JPEG is a no-op.
/// Runs after orientation has been baked in, so dropping the rotation tag
/// is safe.
pub struct ExifStripper;

#[async_trait]
impl ProcessStage for ExifStripper {
    fn name(&self) -> &'static str {
        "EXIF stripper"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        if !image.mime().is_jpeg() {
            return Ok(StageOutput::default());
        }

        convert::strip_metadata(image.path()).await?;

        // In-place rewrite; the working path is unchanged.
        Ok(StageOutput::default())
    }
}
