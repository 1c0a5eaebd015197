//! Size-driven lossy scaling.
//!
//! Included in the pipeline only when the upload exceeds the configured
//! maximum. The stage walks a fixed ladder: flatten PNG to JPEG, re-encode
//! at quality 90 then 70, and finally shrink by a percentage chosen from
//! how far over target the file is, stepping down until the target is met.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mandible_core::{ImageFile, ImageKind, StageOutput};

use crate::command::ProcessError;
use crate::convert;
use crate::stage::ProcessStage;

const MIB: u64 = 1024 * 1024;

pub struct ImageScaler {
    target_size: u64,
}

impl ImageScaler {
    pub fn new(target_size: u64) -> ImageScaler {
        ImageScaler { target_size }
    }

    /// Starting resize percentage, by how many bytes over target the file
    /// is.
    fn initial_percent(excess: u64) -> u32 {
        if excess >= 15 * MIB {
            30
        } else if excess >= 10 * MIB {
            40
        } else if excess >= 5 * MIB {
            60
        } else {
            90
        }
    }

    async fn scale_jpeg(
        &self,
        image: &ImageFile,
        start: PathBuf,
        mime: Option<ImageKind>,
    ) -> Result<StageOutput, ProcessError> {
        // The pipeline retires the original working file when it applies the
        // final path; every path produced in between is scratch.
        let original = image.path().to_path_buf();
        let mut current = start;

        let next = convert::quality(&current, 90).await?;
        retire_intermediate(image, &original, &current);
        current = next;
        if file_size(&current).await? < self.target_size {
            return Ok(done(current, mime));
        }

        let next = convert::quality(&current, 70).await?;
        retire_intermediate(image, &original, &current);
        current = next;
        let mut size = file_size(&current).await?;
        if size < self.target_size {
            return Ok(done(current, mime));
        }

        let mut percent = Self::initial_percent(size - self.target_size);
        loop {
            let next = convert::resize_percent(&current, percent).await?;
            retire_intermediate(image, &original, &current);
            current = next;

            size = file_size(&current).await?;
            if size == 0 || percent < 10 {
                // Leave the last attempt in the scratch set as well.
                retire_intermediate(image, &original, &current);
                return Err(ProcessError::Stage(
                    "could not scale image to desired filesize".to_string(),
                ));
            }
            if size < self.target_size {
                return Ok(done(current, mime));
            }

            percent -= 10;
        }
    }
}

#[async_trait]
impl ProcessStage for ImageScaler {
    fn name(&self) -> &'static str {
        "image scaler"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        match image.mime() {
            ImageKind::Jpeg => {
                self.scale_jpeg(image, image.path().to_path_buf(), None)
                    .await
            }
            ImageKind::Png => {
                // Flatten to JPEG first; lossy PNG scaling is not a thing.
                let flattened = convert::convert_to_jpeg(image.path()).await?;
                self.scale_jpeg(image, flattened, Some(ImageKind::Jpeg))
                    .await
            }
            ImageKind::Gif | ImageKind::Webp => Err(ProcessError::UnsupportedType),
        }
    }
}

fn done(path: PathBuf, mime: Option<ImageKind>) -> StageOutput {
    StageOutput {
        path: Some(path),
        mime,
        ..Default::default()
    }
}

fn retire_intermediate(image: &ImageFile, original: &Path, prev: &Path) {
    if prev != original {
        image.register_scratch(prev.to_path_buf());
    }
}

async fn file_size(path: &Path) -> Result<u64, ProcessError> {
    Ok(tokio::fs::metadata(path).await?.len())
}
