//! Fan-out composite over an ordered list of backends.
//!
//! Implements the same [`ImageStore`] contract as its children, so a
//! composite is substitutable anywhere a single backend is:
//!
//! - `save` — every backend must succeed; the first failure fails the call.
//! - `exists` — true as soon as any backend reports true.
//! - `get` — the first backend to produce a reader wins; later readers are
//!   dropped, which closes them.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use crate::object::StoreObject;
use crate::traits::{ByteStream, ImageStore, StoreError, StoreResult};

pub struct MultiStore {
    backends: Vec<Arc<dyn ImageStore>>,
}

impl MultiStore {
    pub fn new(backends: Vec<Arc<dyn ImageStore>>) -> MultiStore {
        MultiStore { backends }
    }

    pub fn backends(&self) -> &[Arc<dyn ImageStore>] {
        &self.backends
    }
}

#[async_trait]
impl ImageStore for MultiStore {
    /// All-must-succeed. Every backend saves concurrently from its own
    /// re-open of `src`; all outcomes are collected before the verdict so a
    /// failure never cancels a sibling mid-write. Partial writes are not
    /// rolled back.
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject> {
        let mut tasks = JoinSet::new();
        for (index, backend) in self.backends.iter().enumerate() {
            let backend = Arc::clone(backend);
            let src = src.to_path_buf();
            let obj = obj.clone();
            tasks.spawn(async move {
                let result = backend.save(&src, &obj).await.map_err(|e| {
                    StoreError::SaveFailed(format!(
                        "asynchronously saving image on {}: {}",
                        backend.name(),
                        e
                    ))
                });
                (index, result)
            });
        }

        let mut first_error = None;
        let mut saved: Vec<Option<StoreObject>> = (0..self.backends.len()).map(|_| None).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(obj))) => saved[index] = Some(obj),
                Ok((_, Err(e))) => first_error = first_error.or(Some(e)),
                Err(e) => {
                    first_error =
                        first_error.or(Some(StoreError::Backend(format!("save task failed: {}", e))))
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        // URL from the first success in backend iteration order.
        saved
            .into_iter()
            .flatten()
            .next()
            .ok_or_else(|| StoreError::SaveFailed("no store backends configured".to_string()))
    }

    /// Any-true wins; a true answer short-circuits the remaining probes.
    async fn exists(&self, obj: &StoreObject) -> StoreResult<bool> {
        let mut tasks = JoinSet::new();
        for backend in &self.backends {
            let backend = Arc::clone(backend);
            let obj = obj.clone();
            tasks.spawn(async move {
                backend.exists(&obj).await.map_err(|e| {
                    StoreError::Backend(format!(
                        "asynchronously proving existence for image on {}: {}",
                        backend.name(),
                        e
                    ))
                })
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(true)) => return Ok(true),
                Ok(Ok(false)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(StoreError::Backend(format!("exists task failed: {}", e))),
            }
        }

        Ok(false)
    }

    /// First-success wins. Dropping the task set aborts the stragglers and
    /// drops any reader they already produced, so losers never leak.
    async fn get(&self, obj: &StoreObject) -> StoreResult<ByteStream> {
        let mut tasks = JoinSet::new();
        for backend in &self.backends {
            let backend = Arc::clone(backend);
            let obj = obj.clone();
            tasks.spawn(async move {
                backend.get(&obj).await.map_err(|e| {
                    StoreError::ReadFailed(format!(
                        "asynchronously getting image on {}: {}",
                        backend.name(),
                        e
                    ))
                })
            });
        }

        let mut last_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(reader)) => return Ok(reader),
                Ok(Err(e)) => last_error = Some(e),
                Err(e) => last_error = Some(StoreError::Backend(format!("get task failed: {}", e))),
            }
        }

        Err(last_error.unwrap_or_else(|| StoreError::NotFound(obj.id.clone())))
    }

    fn name(&self) -> String {
        self.backends
            .iter()
            .map(|b| b.name())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
