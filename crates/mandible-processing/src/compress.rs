//! Lossless compression pass.

use async_trait::async_trait;
use mandible_core::{ImageFile, ImageKind, StageOutput};

use crate::command::ProcessError;
use crate::convert;
use crate::stage::ProcessStage;

/// Shrinks the file without touching pixels: `jpegtran` for JPEG, `optipng`
/// for PNG. GIF has no lossless pass and is left alone.
pub struct CompressLosslessly;

#[async_trait]
impl ProcessStage for CompressLosslessly {
    fn name(&self) -> &'static str {
        "lossless compressor"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        let outfile = match image.mime() {
            ImageKind::Jpeg => convert::jpegtran(image.path()).await?,
            ImageKind::Png => convert::optipng(image.path()).await?,
            ImageKind::Gif => return Ok(StageOutput::default()),
            ImageKind::Webp => return Err(ProcessError::UnsupportedType),
        };

        Ok(StageOutput {
            path: Some(outfile),
            ..Default::default()
        })
    }
}
