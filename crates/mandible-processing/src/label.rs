//! Image labeling seam.
//!
//! Classification itself is externally defined; the service only cares that
//! something can turn an image path into scored labels. Deployments plug a
//! [`Labeler`] in through the strategy builder, and the stage attaches the
//! top-N results to the upload.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mandible_core::{ImageFile, Label, StageOutput};

use crate::command::ProcessError;
use crate::stage::ProcessStage;

#[async_trait]
pub trait Labeler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify the image, best labels first.
    async fn label(&self, image: &Path) -> anyhow::Result<Vec<Label>>;
}

pub struct LabelStage {
    labeler: Arc<dyn Labeler>,
    top_n: usize,
}

impl LabelStage {
    pub fn new(labeler: Arc<dyn Labeler>, top_n: usize) -> LabelStage {
        LabelStage { labeler, top_n }
    }
}

#[async_trait]
impl ProcessStage for LabelStage {
    fn name(&self) -> &'static str {
        "labeler"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        let mut labels = self
            .labeler
            .label(image.path())
            .await
            .map_err(|e| ProcessError::Stage(format!("{} failed: {}", self.labeler.name(), e)))?;

        labels.truncate(self.top_n);

        Ok(StageOutput {
            labels: Some(labels),
            ..Default::default()
        })
    }
}
