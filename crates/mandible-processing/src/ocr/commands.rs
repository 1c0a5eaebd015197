//! The tesseract-backed OCR commands.
//!
//! Each command preprocesses the image with `convert`, hands the result to
//! `tesseract` and reads back the text file tesseract writes. Scratch files
//! are removed as soon as the text is in memory.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::command::{run_command, suffixed_path, ProcessError};
use crate::convert::GM_COMMAND;
use crate::ocr::filter::WordFilter;

#[derive(Debug, Clone)]
pub struct OcrResult {
    pub kind: &'static str,
    pub text: String,
}

#[async_trait]
pub trait OcrCommand: Send + Sync {
    async fn run(&self, image: &Path) -> Result<OcrResult, ProcessError>;
}

/// Standard pass: upscale to 400% grayscale, recognise English.
pub struct StandardOcr;

#[async_trait]
impl OcrCommand for StandardOcr {
    async fn run(&self, image: &Path) -> Result<OcrResult, ProcessError> {
        let preprocessed = suffixed_path(image, "_standard.jpg");
        let out_base = suffixed_path(image, "_standard");

        let preprocess = vec![
            format!("{}[0]", image.display()),
            "-resize".to_string(),
            "400%".to_string(),
            "-type".to_string(),
            "Grayscale".to_string(),
            preprocessed.display().to_string(),
        ];
        run_command(GM_COMMAND, &preprocess)
            .await
            .map_err(|e| ProcessError::Stage(format!("standard preprocessing failed: {}", e)))?;

        let text = run_tesseract(&preprocessed, &out_base, "eng").await;
        let _ = tokio::fs::remove_file(&preprocessed).await;

        Ok(OcrResult {
            kind: "StandardOCR",
            text: text?,
        })
    }
}

/// Meme pass: upscale, knock out the white fill so the captions survive,
/// recognise with the meme-trained language data.
pub struct MemeOcr;

#[async_trait]
impl OcrCommand for MemeOcr {
    async fn run(&self, image: &Path) -> Result<OcrResult, ProcessError> {
        let preprocessed = suffixed_path(image, "_meme.jpg");
        let out_base = suffixed_path(image, "_meme");

        let preprocess = vec![
            format!("{}[0]", image.display()),
            "-resize".to_string(),
            "400%".to_string(),
            "-fill".to_string(),
            "black".to_string(),
            "-fuzz".to_string(),
            "10%".to_string(),
            "+matte".to_string(),
            "-matte".to_string(),
            "-transparent".to_string(),
            "white".to_string(),
            preprocessed.display().to_string(),
        ];
        run_command(GM_COMMAND, &preprocess)
            .await
            .map_err(|e| ProcessError::Stage(format!("meme preprocessing failed: {}", e)))?;

        let text = run_tesseract(&preprocessed, &out_base, "meme").await;
        let _ = tokio::fs::remove_file(&preprocessed).await;

        Ok(OcrResult {
            kind: "MemeOCR",
            text: text?,
        })
    }
}

/// Run tesseract over `input`, collect the `.txt` it writes next to
/// `out_base` and clean it up.
async fn run_tesseract(
    input: &Path,
    out_base: &Path,
    language: &str,
) -> Result<String, ProcessError> {
    let args = vec![
        "-l".to_string(),
        language.to_string(),
        input.display().to_string(),
        out_base.display().to_string(),
    ];
    run_command("tesseract", &args)
        .await
        .map_err(|e| ProcessError::Stage(format!("tesseract command failed: {}", e)))?;

    let text_path = suffixed_path(out_base, ".txt");
    let text = tokio::fs::read_to_string(&text_path).await?;
    let _ = tokio::fs::remove_file(&text_path).await;

    Ok(text.trim().to_lowercase())
}

/// Runs every inner command concurrently and keeps the output whose
/// filtered text has the most words.
pub struct MultiOcrCommand {
    commands: Vec<Arc<dyn OcrCommand>>,
    filter: WordFilter,
}

impl MultiOcrCommand {
    pub fn new(commands: Vec<Arc<dyn OcrCommand>>, filter: WordFilter) -> MultiOcrCommand {
        MultiOcrCommand { commands, filter }
    }
}

#[async_trait]
impl OcrCommand for MultiOcrCommand {
    async fn run(&self, image: &Path) -> Result<OcrResult, ProcessError> {
        let outcomes = join_all(self.commands.iter().map(|c| c.run(image))).await;

        let mut best: Option<(usize, OcrResult)> = None;
        for outcome in outcomes {
            let mut result = outcome?;
            result.text = self.filter.remove_non_words(&result.text);
            let count = self.filter.word_count(&result.text);

            let better = match &best {
                Some((best_count, _)) => count > *best_count,
                None => true,
            };
            if better {
                best = Some((count, result));
            }
        }

        best.map(|(_, result)| result)
            .ok_or_else(|| ProcessError::Stage("no OCR commands configured".to_string()))
    }
}
