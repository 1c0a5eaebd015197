//! Store construction from configuration.

use std::sync::Arc;

use mandible_core::{Config, StoreConfig};

use crate::gcs::GcsStore;
use crate::local::LocalStore;
use crate::mapper::NamePathMapper;
use crate::memory::InMemoryStore;
use crate::multi::MultiStore;
use crate::s3::S3Store;
use crate::selectel::SelectelStore;
use crate::traits::{ImageStore, StoreError, StoreResult};

const S3_BUCKET_ENV: &str = "S3_BUCKET";
const GCS_BUCKET_ENV: &str = "GCS_BUCKET";

/// Build every configured backend and compose them behind the fan-out
/// store. Any configuration error here is fatal to startup.
pub fn create_stores(config: &Config) -> StoreResult<Arc<MultiStore>> {
    if config.stores.is_empty() {
        return Err(StoreError::Config(
            "at least one store must be configured".to_string(),
        ));
    }

    let mut backends: Vec<Arc<dyn ImageStore>> = Vec::with_capacity(config.stores.len());
    for store in &config.stores {
        backends.push(create_store(store)?);
    }

    Ok(Arc::new(MultiStore::new(backends)))
}

fn create_store(config: &StoreConfig) -> StoreResult<Arc<dyn ImageStore>> {
    match config {
        StoreConfig::Local {
            store_root,
            name_path_map,
            name_path_regex,
        } => {
            let mapper = mapper(name_path_map, name_path_regex)?;
            Ok(Arc::new(LocalStore::new(store_root, mapper)))
        }
        StoreConfig::S3 {
            bucket,
            region,
            store_root,
            name_path_map,
            name_path_regex,
        } => {
            let bucket = env_override(S3_BUCKET_ENV).unwrap_or_else(|| bucket.clone());
            let mapper = mapper(name_path_map, name_path_regex)?;
            Ok(Arc::new(S3Store::new(
                bucket,
                region.clone(),
                store_root.clone(),
                mapper,
            )?))
        }
        StoreConfig::Gcs {
            bucket,
            key_file,
            store_root,
            name_path_map,
            name_path_regex,
        } => {
            let bucket = env_override(GCS_BUCKET_ENV).unwrap_or_else(|| bucket.clone());
            let mapper = mapper(name_path_map, name_path_regex)?;
            Ok(Arc::new(GcsStore::new(
                bucket,
                key_file,
                store_root.clone(),
                mapper,
            )?))
        }
        StoreConfig::Selectel {
            auth_url,
            user,
            key,
            container,
            store_root,
            name_path_map,
            name_path_regex,
        } => {
            let mapper = mapper(name_path_map, name_path_regex)?;
            Ok(Arc::new(SelectelStore::new(
                auth_url.clone(),
                user.clone(),
                key.clone(),
                container.clone(),
                store_root.clone(),
                mapper,
            )))
        }
        StoreConfig::Memory => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn mapper(
    template: &Option<String>,
    expr: &Option<String>,
) -> StoreResult<NamePathMapper> {
    NamePathMapper::from_config(template.as_deref(), expr.as_deref())
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
