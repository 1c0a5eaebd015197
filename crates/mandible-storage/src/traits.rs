//! The store contract all backends implement.

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::object::StoreObject;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("save failed: {0}")]
    SaveFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Streaming artifact body. Dropping the stream closes the underlying
/// connection or file handle.
pub type ByteStream = Pin<Box<dyn Stream<Item = StoreResult<Bytes>> + Send>>;

/// An artifact store.
///
/// `save` takes a filesystem path rather than a reader: each backend
/// re-opens the source itself, which lets the fan-out composite hand the
/// same upload to every backend without teeing.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist the file at `src` under the object's identity. Returns the
    /// object with its public URL populated.
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject>;

    async fn exists(&self, obj: &StoreObject) -> StoreResult<bool>;

    async fn get(&self, obj: &StoreObject) -> StoreResult<ByteStream>;

    /// Human-readable backend name, used in log context.
    fn name(&self) -> String;
}

/// Drain a [`ByteStream`] into memory.
pub async fn read_all(mut stream: ByteStream) -> StoreResult<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data)
}

impl From<StoreError> for mandible_core::AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => {
                mandible_core::AppError::NotFound(format!("object not found: {}", id))
            }
            other => mandible_core::AppError::Upstream(other.to_string()),
        }
    }
}
