//! Google Cloud Storage store.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectStore, PutOptions, PutPayload,
};

use crate::mapper::NamePathMapper;
use crate::object::StoreObject;
use crate::traits::{ByteStream, ImageStore, StoreError, StoreResult};

pub struct GcsStore {
    store: GoogleCloudStorage,
    bucket: String,
    store_root: String,
    mapper: NamePathMapper,
}

impl GcsStore {
    /// Authenticates with the service-account JSON key at `key_file`
    /// (the JWT flow is handled by the client).
    pub fn new(
        bucket: String,
        key_file: &str,
        store_root: String,
        mapper: NamePathMapper,
    ) -> StoreResult<GcsStore> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket.clone())
            .with_service_account_path(key_file)
            .build()
            .map_err(|e| StoreError::Config(format!("building GCS client: {}", e)))?;

        Ok(GcsStore {
            store,
            bucket,
            store_root,
            mapper,
        })
    }

    fn to_key(&self, obj: &StoreObject) -> String {
        let mapped = self.mapper.map_to_path(obj);
        if self.store_root.is_empty() {
            mapped
        } else {
            format!("{}/{}", self.store_root.trim_end_matches('/'), mapped)
        }
    }

    fn to_url(&self, key: &str) -> String {
        format!("https://storage.googleapis.com/{}/{}", self.bucket, key)
    }
}

#[async_trait]
impl ImageStore for GcsStore {
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject> {
        let key = self.to_key(obj);
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StoreError::SaveFailed(format!("reading {}: {}", src.display(), e)))?;

        let mut attributes = Attributes::new();
        if !obj.mime.is_empty() {
            attributes.insert(Attribute::ContentType, obj.mime.clone().into());
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store
            .put_opts(&ObjectPath::from(key.clone()), PutPayload::from(data), options)
            .await
            .map_err(|e| {
                tracing::error!(bucket = %self.bucket, key = %key, error = %e, "GCS upload failed");
                StoreError::SaveFailed(e.to_string())
            })?;

        let mut saved = obj.clone();
        saved.url = self.to_url(&key);
        Ok(saved)
    }

    async fn exists(&self, obj: &StoreObject) -> StoreResult<bool> {
        let key = self.to_key(obj);
        match self.store.head(&ObjectPath::from(key)).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn get(&self, obj: &StoreObject) -> StoreResult<ByteStream> {
        let key = self.to_key(obj);
        let result = match self.store.get(&ObjectPath::from(key)).await {
            Ok(result) => result,
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(StoreError::NotFound(obj.id.clone()))
            }
            Err(e) => return Err(StoreError::ReadFailed(e.to_string())),
        };

        Ok(Box::pin(result.into_stream().map(|chunk| {
            chunk.map_err(|e| StoreError::ReadFailed(e.to_string()))
        })))
    }

    fn name(&self) -> String {
        "GCSStore".to_string()
    }
}
