//! Selectel cloud storage store.
//!
//! Selectel exposes an OpenStack-Swift-compatible REST API: a v1.0 auth
//! handshake trades account credentials for an `X-Auth-Token` and the
//! account's storage URL, and objects are plain PUT/HEAD/GET against
//! `{storage_url}/{container}/{key}`. The token is cached and refreshed once
//! on a 401.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio::sync::RwLock;

use crate::mapper::NamePathMapper;
use crate::object::StoreObject;
use crate::traits::{ByteStream, ImageStore, StoreError, StoreResult};

#[derive(Clone)]
struct AuthSession {
    token: String,
    storage_url: String,
}

pub struct SelectelStore {
    client: reqwest::Client,
    auth_url: String,
    user: String,
    key: String,
    container: String,
    store_root: String,
    mapper: NamePathMapper,
    session: RwLock<Option<AuthSession>>,
}

impl SelectelStore {
    pub fn new(
        auth_url: String,
        user: String,
        key: String,
        container: String,
        store_root: String,
        mapper: NamePathMapper,
    ) -> SelectelStore {
        SelectelStore {
            client: reqwest::Client::new(),
            auth_url,
            user,
            key,
            container,
            store_root,
            mapper,
            session: RwLock::new(None),
        }
    }

    fn to_key(&self, obj: &StoreObject) -> String {
        let mapped = self.mapper.map_to_path(obj);
        if self.store_root.is_empty() {
            mapped
        } else {
            format!("{}/{}", self.store_root.trim_end_matches('/'), mapped)
        }
    }

    async fn session(&self, force_refresh: bool) -> StoreResult<AuthSession> {
        if !force_refresh {
            if let Some(session) = self.session.read().await.clone() {
                return Ok(session);
            }
        }

        let response = self
            .client
            .get(&self.auth_url)
            .header("X-Auth-User", &self.user)
            .header("X-Auth-Key", &self.key)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("Selectel auth request: {}", e)))?;

        if !response.status().is_success() {
            return Err(StoreError::Backend(format!(
                "Selectel auth returned {}",
                response.status()
            )));
        }

        let header = |name: &str| -> StoreResult<String> {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::Backend(format!("Selectel auth response missing {}", name))
                })
        };

        let session = AuthSession {
            token: header("X-Auth-Token")?,
            storage_url: header("X-Storage-Url")?.trim_end_matches('/').to_string(),
        };

        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    fn object_url(&self, session: &AuthSession, key: &str) -> String {
        format!("{}/{}/{}", session.storage_url, self.container, key)
    }
}

#[async_trait]
impl ImageStore for SelectelStore {
    async fn save(&self, src: &Path, obj: &StoreObject) -> StoreResult<StoreObject> {
        let key = self.to_key(obj);
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| StoreError::SaveFailed(format!("reading {}: {}", src.display(), e)))?;

        let mut session = self.session(false).await?;
        for attempt in 0..2 {
            let response = self
                .client
                .put(self.object_url(&session, &key))
                .header("X-Auth-Token", &session.token)
                .header(reqwest::header::CONTENT_TYPE, &obj.mime)
                .body(data.clone())
                .send()
                .await
                .map_err(|e| StoreError::SaveFailed(format!("Selectel put: {}", e)))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                session = self.session(true).await?;
                continue;
            }
            if !response.status().is_success() {
                return Err(StoreError::SaveFailed(format!(
                    "Selectel api returned {}",
                    response.status()
                )));
            }
            break;
        }

        let mut saved = obj.clone();
        saved.url = self.object_url(&session, &key);
        Ok(saved)
    }

    async fn exists(&self, obj: &StoreObject) -> StoreResult<bool> {
        let key = self.to_key(obj);
        let session = self.session(false).await?;

        let response = self
            .client
            .head(self.object_url(&session, &key))
            .header("X-Auth-Token", &session.token)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("Selectel head: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StoreError::Backend(format!(
                "Selectel api returned {}",
                status
            ))),
        }
    }

    async fn get(&self, obj: &StoreObject) -> StoreResult<ByteStream> {
        let key = self.to_key(obj);
        let session = self.session(false).await?;

        let response = self
            .client
            .get(self.object_url(&session, &key))
            .header("X-Auth-Token", &session.token)
            .send()
            .await
            .map_err(|e| StoreError::ReadFailed(format!("Selectel get: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(obj.id.clone())),
            status if status.is_success() => Ok(Box::pin(response.bytes_stream().map(|chunk| {
                chunk.map_err(|e| StoreError::ReadFailed(e.to_string()))
            }))),
            status => Err(StoreError::ReadFailed(format!(
                "Selectel api returned {}",
                status
            ))),
        }
    }

    fn name(&self) -> String {
        "SelectelStore".to_string()
    }
}
