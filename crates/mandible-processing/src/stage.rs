//! The pipeline stage capability.

use async_trait::async_trait;
use mandible_core::{ImageFile, StageOutput};

use crate::command::ProcessError;

/// One named transformation.
///
/// Stages read the image's current state and describe their mutation as a
/// [`StageOutput`]; the pipeline applies it. Stages never see a stale view:
/// within a sequential run each stage observes the exact path the previous
/// stage wrote, and within a parallel group all stages observe the state at
/// group entry.
#[async_trait]
pub trait ProcessStage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError>;
}
