//! Pipeline composition and request-level strategies.
//!
//! A [`Pipeline`] is a list of steps: single stages run sequentially, each
//! observing the previous stage's output, and a [`PipelineStep::Parallel`]
//! group launches its stages together against the state at group entry. The
//! group is structured: it returns only after every child has finished,
//! surfacing the first error observed.

use std::sync::Arc;

use futures::future::join_all;
use mandible_core::{Config, ImageFile};

use crate::command::ProcessError;
use crate::stage::ProcessStage;

pub enum PipelineStep {
    Stage(Box<dyn ProcessStage>),
    Parallel(Vec<Box<dyn ProcessStage>>),
}

#[derive(Default)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>) -> Pipeline {
        Pipeline { steps }
    }

    /// The passthrough pipeline: no stages at all.
    pub fn empty() -> Pipeline {
        Pipeline::default()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub async fn run(&self, image: &mut ImageFile) -> Result<(), ProcessError> {
        for step in &self.steps {
            match step {
                PipelineStep::Stage(stage) => {
                    let output = stage.process(image).await.map_err(|e| {
                        ProcessError::Stage(format!("error processing on {}: {}", stage.name(), e))
                    })?;
                    image.apply(output);
                }
                PipelineStep::Parallel(stages) => {
                    let outcomes =
                        join_all(stages.iter().map(|stage| stage.process(&*image))).await;

                    let mut outputs = Vec::with_capacity(outcomes.len());
                    let mut first_error = None;
                    for (stage, outcome) in stages.iter().zip(outcomes) {
                        match outcome {
                            Ok(output) => outputs.push(output),
                            Err(e) => {
                                first_error = first_error.or_else(|| {
                                    Some(ProcessError::Stage(format!(
                                        "error asynchronously processing on {}: {}",
                                        stage.name(),
                                        e
                                    )))
                                })
                            }
                        }
                    }

                    if let Some(error) = first_error {
                        return Err(error);
                    }

                    for output in outputs {
                        image.apply(output);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Builds the pipeline for one incoming upload.
pub type ProcessorStrategy =
    Arc<dyn Fn(&Config, &ImageFile) -> Result<Pipeline, ProcessError> + Send + Sync>;

pub mod strategies {
    //! The shipped strategies. Stateful collaborators (the OCR dictionary,
    //! a labeler) are baked into the strategy closure at startup.

    use std::sync::Arc;

    use mandible_core::{Config, ImageFile};

    use super::{Pipeline, PipelineStep, ProcessorStrategy};
    use crate::command::ProcessError;
    use crate::compress::CompressLosslessly;
    use crate::exif::ExifStripper;
    use crate::label::{LabelStage, Labeler};
    use crate::ocr::{Dictionary, OcrStage};
    use crate::orient::ImageOrienter;
    use crate::scale::ImageScaler;
    use crate::stage::ProcessStage;
    use crate::thumbnail::ThumbnailStage;

    /// No stages; the upload is persisted exactly as received.
    pub fn passthrough() -> ProcessorStrategy {
        Arc::new(|_config: &Config, _image: &ImageFile| Ok(Pipeline::empty()))
    }

    /// The full treatment: orient, lossless-compress, strip metadata,
    /// scale down oversized files, then thumbs / OCR / labels in parallel.
    pub fn everything(
        dictionary: Option<Arc<Dictionary>>,
        labeler: Option<(Arc<dyn Labeler>, usize)>,
    ) -> ProcessorStrategy {
        Arc::new(move |config: &Config, image: &ImageFile| {
            let size = std::fs::metadata(image.path())
                .map_err(ProcessError::Io)?
                .len();

            let mut steps: Vec<PipelineStep> = vec![
                PipelineStep::Stage(Box::new(ImageOrienter)),
                PipelineStep::Stage(Box::new(CompressLosslessly)),
                PipelineStep::Stage(Box::new(ExifStripper)),
            ];

            if size > config.max_file_size {
                steps.push(PipelineStep::Stage(Box::new(ImageScaler::new(
                    config.max_file_size,
                ))));
            }

            let mut parallel: Vec<Box<dyn ProcessStage>> = Vec::new();
            if let Some(dictionary) = &dictionary {
                parallel.push(Box::new(OcrStage::duel(Arc::clone(dictionary))));
            }
            if let Some((labeler, top_n)) = &labeler {
                parallel.push(Box::new(LabelStage::new(Arc::clone(labeler), *top_n)));
            }
            for thumb in image.thumbs() {
                parallel.push(Box::new(ThumbnailStage::new(thumb.clone())));
            }

            if !parallel.is_empty() {
                steps.push(PipelineStep::Parallel(parallel));
            }

            Ok(Pipeline::new(steps))
        })
    }

    /// Thumbs only; used by the re-thumbnail endpoint.
    pub fn thumbnail_only() -> ProcessorStrategy {
        Arc::new(|_config: &Config, image: &ImageFile| {
            let parallel: Vec<Box<dyn ProcessStage>> = image
                .thumbs()
                .iter()
                .map(|thumb| Box::new(ThumbnailStage::new(thumb.clone())) as Box<dyn ProcessStage>)
                .collect();

            if parallel.is_empty() {
                return Ok(Pipeline::empty());
            }
            Ok(Pipeline::new(vec![PipelineStep::Parallel(parallel)]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mandible_core::StageOutput;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const GIF_1X1: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3B,
    ];

    async fn gif_image(dir: &tempfile::TempDir) -> ImageFile {
        let path = dir.path().join("upload");
        tokio::fs::write(&path, GIF_1X1).await.unwrap();
        ImageFile::create("", path, Vec::new()).await.unwrap()
    }

    /// Writes a sibling file and advances the working path to it.
    struct AdvanceStage {
        tag: &'static str,
    }

    #[async_trait]
    impl ProcessStage for AdvanceStage {
        fn name(&self) -> &'static str {
            "advance"
        }

        async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
            let next = PathBuf::from(format!("{}_{}", image.path().display(), self.tag));
            tokio::fs::copy(image.path(), &next).await?;
            Ok(StageOutput {
                path: Some(next),
                ..Default::default()
            })
        }
    }

    struct FailStage;

    #[async_trait]
    impl ProcessStage for FailStage {
        fn name(&self) -> &'static str {
            "fail"
        }

        async fn process(&self, _image: &ImageFile) -> Result<StageOutput, ProcessError> {
            Err(ProcessError::Stage("boom".to_string()))
        }
    }

    /// Records the path it observed, then reports OCR text.
    struct SnapshotStage {
        observed: Arc<std::sync::Mutex<Vec<PathBuf>>>,
        delay_ms: u64,
        finished: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProcessStage for SnapshotStage {
        fn name(&self) -> &'static str {
            "snapshot"
        }

        async fn process(&self, image: &ImageFile) -> Result<StageOutput, ProcessError> {
            self.observed
                .lock()
                .unwrap()
                .push(image.path().to_path_buf());
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutput::default())
        }
    }

    #[tokio::test]
    async fn empty_pipeline_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = gif_image(&dir).await;
        let before = image.path().to_path_buf();

        Pipeline::empty().run(&mut image).await.unwrap();
        assert_eq!(image.path(), before);

        image.clean().await;
    }

    #[tokio::test]
    async fn sequential_stages_observe_prior_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = gif_image(&dir).await;
        let original = image.path().to_path_buf();

        let pipeline = Pipeline::new(vec![
            PipelineStep::Stage(Box::new(AdvanceStage { tag: "one" })),
            PipelineStep::Stage(Box::new(AdvanceStage { tag: "two" })),
        ]);
        pipeline.run(&mut image).await.unwrap();

        let expected = format!("{}_one_two", original.display());
        assert_eq!(image.path(), PathBuf::from(expected));

        image.clean().await;
        assert!(!original.exists());
    }

    #[tokio::test]
    async fn failure_stops_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = gif_image(&dir).await;

        let pipeline = Pipeline::new(vec![
            PipelineStep::Stage(Box::new(FailStage)),
            PipelineStep::Stage(Box::new(AdvanceStage { tag: "never" })),
        ]);
        let err = pipeline.run(&mut image).await.unwrap_err();
        assert!(err.to_string().contains("fail"));

        image.clean().await;
    }

    #[tokio::test]
    async fn parallel_stages_see_entry_state_and_all_finish() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = gif_image(&dir).await;
        let entry = image.path().to_path_buf();

        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let finished = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new(vec![PipelineStep::Parallel(vec![
            Box::new(SnapshotStage {
                observed: observed.clone(),
                delay_ms: 0,
                finished: finished.clone(),
            }),
            Box::new(SnapshotStage {
                observed: observed.clone(),
                delay_ms: 20,
                finished: finished.clone(),
            }),
        ])]);
        pipeline.run(&mut image).await.unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 2);
        for path in observed.lock().unwrap().iter() {
            assert_eq!(path, &entry);
        }

        image.clean().await;
    }

    #[tokio::test]
    async fn parallel_group_waits_for_all_even_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = gif_image(&dir).await;

        let observed = Arc::new(std::sync::Mutex::new(Vec::new()));
        let finished = Arc::new(AtomicUsize::new(0));

        let pipeline = Pipeline::new(vec![PipelineStep::Parallel(vec![
            Box::new(FailStage),
            Box::new(SnapshotStage {
                observed,
                delay_ms: 20,
                finished: finished.clone(),
            }),
        ])]);
        let err = pipeline.run(&mut image).await.unwrap_err();
        assert!(err.to_string().contains("asynchronously"));

        // the slow sibling still ran to completion before the error surfaced
        assert_eq!(finished.load(Ordering::SeqCst), 1);

        image.clean().await;
    }

    #[tokio::test]
    async fn passthrough_strategy_builds_an_empty_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let image = gif_image(&dir).await;
        let config = Config::test_default();

        let pipeline = strategies::passthrough()(&config, &image).unwrap();
        assert!(pipeline.is_empty());
    }

    #[tokio::test]
    async fn everything_strategy_skips_the_scaler_for_small_files() {
        let dir = tempfile::tempdir().unwrap();
        let image = gif_image(&dir).await;
        let config = Config::test_default();

        let pipeline = strategies::everything(None, None)(&config, &image).unwrap();
        // orient + compress + exif, no scaler, no parallel group
        assert_eq!(pipeline.steps.len(), 3);
        assert!(pipeline
            .steps
            .iter()
            .all(|s| matches!(s, PipelineStep::Stage(_))));
    }

    #[tokio::test]
    async fn everything_strategy_adds_the_scaler_for_oversized_files() {
        let dir = tempfile::tempdir().unwrap();
        let image = gif_image(&dir).await;
        let mut config = Config::test_default();
        config.max_file_size = 10; // everything is oversized now

        let pipeline = strategies::everything(None, None)(&config, &image).unwrap();
        assert_eq!(pipeline.steps.len(), 4);
    }
}
