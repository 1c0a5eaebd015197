//! Local filesystem store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs;
use tokio_util::io::ReaderStream;

use crate::mapper::NamePathMapper;
use crate::object::StoreObject;
use crate::traits::{ByteStream, ImageStore, StoreError, StoreResult};

pub struct LocalStore {
    store_root: PathBuf,
    mapper: NamePathMapper,
}

impl LocalStore {
    pub fn new(store_root: impl Into<PathBuf>, mapper: NamePathMapper) -> LocalStore {
        LocalStore {
            store_root: store_root.into(),
            mapper,
        }
    }

    fn to_path(&self, obj: &StoreObject) -> PathBuf {
        self.store_root.join(self.mapper.map_to_path(obj))
    }
}

#[async_trait]
impl ImageStore for LocalStore {
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject> {
        let dest = self.to_path(obj);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::SaveFailed(format!(
                    "creating parent directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        fs::copy(src, &dest).await.map_err(|e| {
            StoreError::SaveFailed(format!("copying to {}: {}", dest.display(), e))
        })?;

        let mut saved = obj.clone();
        saved.url = dest.to_string_lossy().into_owned();
        Ok(saved)
    }

    async fn exists(&self, obj: &StoreObject) -> StoreResult<bool> {
        Ok(fs::try_exists(self.to_path(obj)).await?)
    }

    async fn get(&self, obj: &StoreObject) -> StoreResult<ByteStream> {
        let path = self.to_path(obj);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(obj.id.clone()))
            }
            Err(e) => return Err(StoreError::ReadFailed(format!("{}: {}", path.display(), e))),
        };

        Ok(Box::pin(
            ReaderStream::new(file).map(|chunk| chunk.map_err(StoreError::from)),
        ))
    }

    fn name(&self) -> String {
        "LocalStore".to_string()
    }
}
