//! Core types for the mandible image service.
//!
//! This crate holds everything the storage and processing layers agree on:
//! the working-file model ([`ImageFile`]), MIME sniffing ([`ImageKind`]),
//! thumbnail requests ([`ThumbSpec`]), configuration and the unified error
//! type ([`AppError`]).

pub mod config;
pub mod error;
pub mod image_file;
pub mod mime;
pub mod thumbnail;

pub use config::{Config, StoreConfig};
pub use error::AppError;
pub use image_file::{ImageFile, Label, StageOutput};
pub use mime::ImageKind;
pub use thumbnail::{parse_thumbs, ThumbShape, ThumbSpec};
