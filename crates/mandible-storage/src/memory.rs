//! In-memory store, used by tests and single-process deployments.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use crate::object::StoreObject;
use crate::traits::{ByteStream, ImageStore, StoreError, StoreResult};

/// Keeps whole artifacts in a mutex-guarded map keyed by object id.
#[derive(Default)]
pub struct InMemoryStore {
    files: Mutex<HashMap<String, Bytes>>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    /// Pre-populate an id, bypassing `save`. Lets tests seed collisions.
    pub fn insert(&self, id: impl Into<String>, data: impl Into<Bytes>) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(id.into(), data.into());
    }
}

#[async_trait]
impl ImageStore for InMemoryStore {
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject> {
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StoreError::SaveFailed(format!("reading {}: {}", src.display(), e)))?;

        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        files.insert(obj.id.clone(), Bytes::from(data));

        let mut saved = obj.clone();
        saved.url = format!("memory://{}", obj.id);
        Ok(saved)
    }

    async fn exists(&self, obj: &StoreObject) -> StoreResult<bool> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        Ok(files.contains_key(&obj.id))
    }

    async fn get(&self, obj: &StoreObject) -> StoreResult<ByteStream> {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        match files.get(&obj.id) {
            Some(data) => {
                let chunk: StoreResult<Bytes> = Ok(data.clone());
                Ok(Box::pin(stream::iter([chunk])))
            }
            None => Err(StoreError::NotFound(obj.id.clone())),
        }
    }

    fn name(&self) -> String {
        "InMemoryStore".to_string()
    }
}
