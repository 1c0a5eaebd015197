//! Amazon S3 store (and S3-compatible endpoints).

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, Attributes, Error as ObjectStoreError, ObjectStore, PutOptions, PutPayload,
};

use crate::mapper::NamePathMapper;
use crate::object::StoreObject;
use crate::traits::{ByteStream, ImageStore, StoreError, StoreResult};

pub struct S3Store {
    store: AmazonS3,
    bucket: String,
    region: String,
    store_root: String,
    mapper: NamePathMapper,
}

impl S3Store {
    /// Credentials come from the environment (`AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY`, instance metadata, ...), never from the
    /// config file.
    pub fn new(
        bucket: String,
        region: String,
        store_root: String,
        mapper: NamePathMapper,
    ) -> StoreResult<S3Store> {
        let store = AmazonS3Builder::from_env()
            .with_region(region.clone())
            .with_bucket_name(bucket.clone())
            .build()
            .map_err(|e| StoreError::Config(format!("building S3 client: {}", e)))?;

        Ok(S3Store {
            store,
            bucket,
            region,
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

    /// Canonical public HTTPS URL for a key.
    fn to_url(&self, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket, self.region, key
        )
    }
}

#[async_trait]
impl ImageStore for S3Store {
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject> {
        let key = self.to_key(obj);
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StoreError::SaveFailed(format!("reading {}: {}", src.display(), e)))?;
        let size = data.len();

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
                tracing::error!(bucket = %self.bucket, key = %key, size_bytes = size, error = %e, "S3 upload failed");
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
        "S3Store".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> S3Store {
        S3Store::new(
            "cdn-images".to_string(),
            "us-east-1".to_string(),
            "mandible".to_string(),
            NamePathMapper::identity(),
        )
        .unwrap()
    }

    #[test]
    fn keys_are_rooted_and_mapped() {
        let s3 = store();
        let obj = StoreObject::thumbnail("abc1234/small", "image/png");
        assert_eq!(s3.to_key(&obj), "mandible/abc1234/small");
    }

    #[test]
    fn urls_are_canonical() {
        let s3 = store();
        assert_eq!(
            s3.to_url("mandible/abc1234"),
            "https://cdn-images.s3.us-east-1.amazonaws.com/mandible/abc1234"
        );
    }
}
