//! Text extraction.
//!
//! OCR runs as one pipeline stage wrapping an [`OcrCommand`]. The usual
//! configuration is the duel: a meme-tuned pass and a standard pass run
//! concurrently and the output with the most real words (after the token
//! filter) wins.

pub mod commands;
pub mod filter;

use std::sync::Arc;

use async_trait::async_trait;
use mandible_core::{ImageFile, StageOutput};

use crate::command::ProcessError;
use crate::stage::ProcessStage;

pub use commands::{MemeOcr, MultiOcrCommand, OcrCommand, OcrResult, StandardOcr};
pub use filter::{Dictionary, WordFilter};

pub struct OcrStage {
    command: Arc<dyn OcrCommand>,
}

impl OcrStage {
    pub fn new(command: Arc<dyn OcrCommand>) -> OcrStage {
        OcrStage { command }
    }

    /// Meme and standard OCR racing for the best word count.
    pub fn duel(dictionary: Arc<Dictionary>) -> OcrStage {
        let commands: Vec<Arc<dyn OcrCommand>> =
            vec![Arc::new(MemeOcr), Arc::new(StandardOcr)];
        OcrStage::new(Arc::new(MultiOcrCommand::new(
            commands,
            WordFilter::new(dictionary),
        )))
    }

    /// Standard OCR only.
    pub fn standard() -> OcrStage {
        OcrStage::new(Arc::new(StandardOcr))
    }
}

#[async_trait]
impl ProcessStage for OcrStage {
    fn name(&self) -> &'static str {
        "OCR runner"
    }

    async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
        let result = self.command.run(image.path()).await.map_err(|e| {
            tracing::error!(error = %e, "error running OCR");
            e
        })?;

        Ok(StageOutput {
            ocr_text: Some(result.text),
            ..Default::default()
        })
    }
}
