//! The upload controller.
//!
//! One request flows: spill the incoming bytes to a temp file, wrap it,
//! build the pipeline from the configured strategy, run it, stamp a fresh
//! id, persist the original and every storable thumb, and assemble the
//! response. Temp files are cleaned whether or not the flow succeeds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use mandible_core::{AppError, ImageFile, ThumbSpec};
use mandible_storage::{ImageStore, StoreObject};

use crate::auth::AuthenticatedUser;
use crate::response::ImageResponse;
use crate::state::AppState;

/// Write an incoming payload to a fresh temp file and hand ownership of the
/// path to the caller.
pub async fn spill_to_tmp(data: &[u8]) -> Result<PathBuf, AppError> {
    let (_file, path) = tempfile::Builder::new()
        .prefix("image")
        .tempfile()
        .map_err(|e| AppError::Internal(format!("creating temp file: {}", e)))?
        .keep()
        .map_err(|e| AppError::Internal(format!("persisting temp file: {}", e)))?;

    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::Internal(format!("spilling upload to {}: {}", path.display(), e)))?;

    Ok(path)
}

/// Spill a store reader to a temp file (the re-thumbnail and OCR endpoints
/// pull originals back out of the store).
pub async fn spill_stream_to_tmp(
    stream: mandible_storage::ByteStream,
) -> Result<PathBuf, AppError> {
    let data = mandible_storage::read_all(stream).await?;
    spill_to_tmp(&data).await
}

pub async fn process_upload(
    state: &AppState,
    data: Bytes,
    filename: String,
    thumbs: Vec<ThumbSpec>,
    user: Option<&AuthenticatedUser>,
) -> Result<ImageResponse, AppError> {
    let tmp = spill_to_tmp(&data)
        .await
        .map_err(|_| AppError::Internal("Error saving to disk!".to_string()))?;

    let mut image = match ImageFile::create(filename, &tmp, thumbs).await {
        Ok(image) => image,
        Err(err) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
    };

    let result = run_and_store(state, &mut image, user).await;
    image.clean().await;
    result
}

async fn run_and_store(
    state: &AppState,
    image: &mut ImageFile,
    user: Option<&AuthenticatedUser>,
) -> Result<ImageResponse, AppError> {
    let pipeline = (state.strategy)(&state.config, image).map_err(|e| {
        tracing::error!(error = %e, "error building processor pipeline");
        AppError::Internal("Unable to process image!".to_string())
    })?;

    pipeline.run(image).await.map_err(|e| {
        tracing::error!(error = %e, name = %image.original_name(), "error processing upload");
        AppError::Upstream("Unable to process image!".to_string())
    })?;

    let hash = state
        .hash_generator
        .get()
        .await
        .ok_or_else(|| AppError::Internal("hash generator stopped".to_string()))?;
    image.set_hash(hash.clone());

    let original = StoreObject::original(hash.clone(), image.mime().as_mime());
    let saved = state
        .store
        .save(image.path(), &original)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, hash = %hash, "error saving processed output to store");
            AppError::Upstream("Unable to save image!".to_string())
        })?;

    let thumbs = store_thumbs(state, image, &hash).await?;
    for (name, url) in &thumbs {
        image.set_thumb_url(name, url.clone());
    }

    let size = image
        .file_size()
        .await
        .map_err(|_| AppError::Internal("Unable to fetch image metadata!".to_string()))?;
    let (width, height) = image
        .dimensions()
        .map_err(|e| AppError::Internal(format!("Error fetching upload dimensions: {}", e)))?;

    let labels = image.labels().map(|labels| {
        labels
            .iter()
            .map(|l| (l.name.clone(), l.score))
            .collect::<BTreeMap<_, _>>()
    });

    Ok(ImageResponse {
        link: saved.url,
        mime: image.mime().as_mime().to_string(),
        name: image.original_name().to_string(),
        hash,
        size,
        width,
        height,
        ocrtext: image.ocr_text().unwrap_or_default().to_string(),
        thumbs,
        user_id: user.map(|u| u.user_id.clone()).unwrap_or_default(),
        labels,
    })
}

async fn store_thumbs(
    state: &AppState,
    image: &ImageFile,
    hash: &str,
) -> Result<BTreeMap<String, String>, AppError> {
    let mut urls = BTreeMap::new();

    for thumb in image.thumbs() {
        if thumb.no_store {
            continue;
        }

        let local = thumb.local_path.as_deref().ok_or_else(|| {
            AppError::Internal(format!("thumbnail {} produced no output", thumb.name))
        })?;

        let url = save_thumb(state, local, hash, &thumb.name, image.mime().as_mime()).await?;
        state.stats.thumbnail(&thumb.name);
        urls.insert(thumb.name.clone(), url);
    }

    Ok(urls)
}

/// Persist one thumbnail under `{hash}/{name}`.
pub async fn save_thumb(
    state: &AppState,
    local: &Path,
    hash: &str,
    name: &str,
    mime: &str,
) -> Result<String, AppError> {
    let obj = StoreObject::thumbnail(format!("{}/{}", hash, name), mime);
    let saved = state.store.save(local, &obj).await.map_err(|e| {
        tracing::error!(error = %e, hash = %hash, thumb = %name, "error storing thumbnail");
        AppError::Upstream("Unable to store thumbnail!".to_string())
    })?;
    Ok(saved.url)
}
