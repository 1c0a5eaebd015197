//! Image processing pipeline for the mandible image service.
//!
//! Transformation stages implement [`ProcessStage`] and are composed by
//! [`Pipeline`] into sequential runs with optional parallel groups. The
//! concrete image work is delegated to the GraphicsMagick-family command
//! line tools through [`command`]; each stage writes its output to a fresh
//! path derived from its input.

pub mod command;
pub mod compress;
pub mod convert;
pub mod exif;
pub mod label;
pub mod ocr;
pub mod orient;
pub mod pipeline;
pub mod scale;
pub mod stage;
pub mod thumbnail;

pub use command::ProcessError;
pub use compress::CompressLosslessly;
pub use exif::ExifStripper;
pub use label::{LabelStage, Labeler};
pub use orient::ImageOrienter;
pub use pipeline::{strategies, Pipeline, PipelineStep, ProcessorStrategy};
pub use scale::ImageScaler;
pub use stage::ProcessStage;
pub use thumbnail::ThumbnailStage;
