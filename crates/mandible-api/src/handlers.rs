//! Route handlers.

use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::{Form, Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use mandible_core::{parse_thumbs, AppError, ImageFile, ThumbSpec};
use mandible_processing::ocr::{Dictionary, OcrStage};
use mandible_processing::{strategies, ProcessStage};
use mandible_storage::{ImageStore, StoreObject};
use serde::Deserialize;

use crate::auth::AuthenticatedUser;
use crate::error::HttpAppError;
use crate::extract;
use crate::response::{success, OcrResponse};
use crate::state::AppState;
use crate::upload;

const WELCOME_PAGE: &str = concat!(
    "<html><head><title>Mandible image service</title></head>",
    "<body style=\"background-color: #2b2b2b; color: white\">",
    "Congratulations! Your image upload server is up and running. ",
    "POST an image to /file, /url or /base64 to get started.",
    "</body></html>"
);

pub async fn welcome() -> Html<&'static str> {
    Html(WELCOME_PAGE)
}

#[derive(Debug, Deserialize)]
pub struct UploadForm {
    image: String,
    #[serde(default)]
    thumbs: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ThumbnailForm {
    #[serde(default)]
    uid: String,
    #[serde(default)]
    thumbs: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OcrForm {
    #[serde(default)]
    uid: String,
}

fn form_error(rejection: FormRejection) -> HttpAppError {
    HttpAppError(AppError::BadRequest(format!(
        "Error parsing request form: {}",
        rejection.body_text()
    )))
}

fn parse_thumb_field(raw: Option<&str>) -> Result<Vec<ThumbSpec>, AppError> {
    parse_thumbs(raw.unwrap_or_default())
}

/// Check the HMAC grant and bind it to the user id in the path.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    expected_user: &str,
) -> Result<AuthenticatedUser, AppError> {
    let user = state.authenticator.authenticate(headers).map_err(|e| {
        tracing::warn!(error = %e, "authentication error");
        AppError::Unauthorized(e.to_string())
    })?;

    if user.user_id != expected_user {
        return Err(AppError::Unauthorized(
            "The authenticated user may not upload to this account.".to_string(),
        ));
    }

    Ok(user)
}

// ---- anonymous upload channels ----

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, HttpAppError> {
    file_upload(&state, multipart, None).await
}

pub async fn upload_url(
    State(state): State<Arc<AppState>>,
    form: Result<Form<UploadForm>, FormRejection>,
) -> Result<Response, HttpAppError> {
    let Form(form) = form.map_err(form_error)?;
    url_upload(&state, form, None).await
}

pub async fn upload_base64(
    State(state): State<Arc<AppState>>,
    form: Result<Form<UploadForm>, FormRejection>,
) -> Result<Response, HttpAppError> {
    let Form(form) = form.map_err(form_error)?;
    base64_upload(&state, form, None).await
}

// ---- authenticated upload channels ----

pub async fn user_upload_file(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, HttpAppError> {
    let user = authenticate(&state, &headers, &user_id)?;
    file_upload(&state, multipart, Some(user)).await
}

pub async fn user_upload_url(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    form: Result<Form<UploadForm>, FormRejection>,
) -> Result<Response, HttpAppError> {
    let user = authenticate(&state, &headers, &user_id)?;
    let Form(form) = form.map_err(form_error)?;
    url_upload(&state, form, Some(user)).await
}

pub async fn user_upload_base64(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    form: Result<Form<UploadForm>, FormRejection>,
) -> Result<Response, HttpAppError> {
    let user = authenticate(&state, &headers, &user_id)?;
    let Form(form) = form.map_err(form_error)?;
    base64_upload(&state, form, Some(user)).await
}

async fn file_upload(
    state: &AppState,
    multipart: Multipart,
    user: Option<AuthenticatedUser>,
) -> Result<Response, HttpAppError> {
    let (data, filename, thumbs_raw) = extract::from_multipart(multipart).await?;
    let thumbs = parse_thumb_field(thumbs_raw.as_deref())?;

    state.stats.upload("file");
    let response = upload::process_upload(state, data, filename, thumbs, user.as_ref()).await?;
    Ok(success(response))
}

async fn url_upload(
    state: &AppState,
    form: UploadForm,
    user: Option<AuthenticatedUser>,
) -> Result<Response, HttpAppError> {
    let thumbs = parse_thumb_field(form.thumbs.as_deref())?;
    let (data, filename) =
        extract::download(&state.http, &state.config.user_agent, &form.image).await?;

    state.stats.upload("url");
    let response = upload::process_upload(state, data, filename, thumbs, user.as_ref()).await?;
    Ok(success(response))
}

async fn base64_upload(
    state: &AppState,
    form: UploadForm,
    user: Option<AuthenticatedUser>,
) -> Result<Response, HttpAppError> {
    let thumbs = parse_thumb_field(form.thumbs.as_deref())?;
    let data = extract::decode_base64(&form.image)?;

    state.stats.upload("base64");
    let response = upload::process_upload(state, data, String::new(), thumbs, user.as_ref()).await?;
    Ok(success(response))
}

// ---- derived-artifact endpoints ----

/// Re-thumbnail an existing upload and serve the result back.
pub async fn thumbnail(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ThumbnailForm>, FormRejection>,
) -> Result<Response, HttpAppError> {
    let Form(form) = form.map_err(form_error)?;
    if form.uid.is_empty() {
        return Err(AppError::BadRequest("Image ID must be passed as \"uid\"".to_string()).into());
    }

    let thumbs = parse_thumb_field(form.thumbs.as_deref())?;
    if thumbs.len() != 1 {
        return Err(
            AppError::BadRequest("Wrong number of thumbnails, expected 1".to_string()).into(),
        );
    }

    let original = StoreObject::original(form.uid.clone(), "");
    let reader = state.store.get(&original).await.map_err(|e| {
        tracing::warn!(uid = %form.uid, error = %e, "thumbnail source lookup failed");
        AppError::NotFound(format!("Error retrieving image with ID: {}", form.uid))
    })?;

    let tmp = upload::spill_stream_to_tmp(reader).await?;
    let mut image = match ImageFile::create("", &tmp, thumbs).await {
        Ok(image) => image,
        Err(err) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
    };
    image.set_hash(form.uid.clone());

    let result = run_thumbnail(&state, &mut image).await;
    image.clean().await;
    result.map_err(Into::into)
}

async fn run_thumbnail(state: &AppState, image: &mut ImageFile) -> Result<Response, AppError> {
    let pipeline = strategies::thumbnail_only()(&state.config, image).map_err(|e| {
        tracing::error!(error = %e, "error building thumbnail pipeline");
        AppError::Internal("Unable to process thumbnail!".to_string())
    })?;

    pipeline.run(image).await.map_err(|e| {
        tracing::error!(error = %e, "error processing thumbnail");
        AppError::Upstream("Unable to process thumbnail!".to_string())
    })?;

    let hash = image
        .hash()
        .ok_or_else(|| AppError::Internal("thumbnail request lost its id".to_string()))?
        .to_string();
    let mime = image.mime();

    let thumb = &image.thumbs()[0];
    let local = thumb.local_path.clone().ok_or_else(|| {
        AppError::Internal(format!("thumbnail {} produced no output", thumb.name))
    })?;

    if !thumb.no_store {
        upload::save_thumb(state, &local, &hash, &thumb.name, mime.as_mime()).await?;
    }
    state.stats.thumbnail(&thumb.name);

    let data = tokio::fs::read(&local)
        .await
        .map_err(|e| AppError::Internal(format!("reading thumbnail output: {}", e)))?;
    let content_type = thumb.output_format(mime).as_mime();

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        data,
    )
        .into_response())
}

/// Run OCR over an existing upload.
pub async fn ocr(
    State(state): State<Arc<AppState>>,
    form: Result<Form<OcrForm>, FormRejection>,
) -> Result<Response, HttpAppError> {
    let Form(form) = form.map_err(form_error)?;
    if form.uid.is_empty() {
        return Err(AppError::BadRequest("Image ID must be passed as \"uid\"".to_string()).into());
    }

    let original = StoreObject::original(form.uid.clone(), "");
    let reader = state.store.get(&original).await.map_err(|e| {
        tracing::warn!(uid = %form.uid, error = %e, "OCR source lookup failed");
        AppError::BadRequest(format!("Error retrieving image with ID: {}", form.uid))
    })?;

    let tmp = upload::spill_stream_to_tmp(reader).await?;
    let mut image = match ImageFile::create("", &tmp, Vec::new()).await {
        Ok(image) => image,
        Err(err) => {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
    };
    image.set_hash(form.uid.clone());

    let result = run_ocr(&state, &mut image).await;
    image.clean().await;
    result.map_err(Into::into)
}

async fn run_ocr(state: &AppState, image: &mut ImageFile) -> Result<Response, AppError> {
    let dictionary = state
        .dictionary
        .clone()
        .unwrap_or_else(|| Arc::new(Dictionary::default()));

    let stage = OcrStage::duel(dictionary);
    let output = stage.process(image).await.map_err(|e| {
        tracing::error!(error = %e, "error running OCR strategy");
        AppError::Upstream("Unable to execute OCR strategy".to_string())
    })?;
    image.apply(output);

    Ok(success(OcrResponse {
        hash: image.hash().unwrap_or_default().to_string(),
        ocrtext: image.ocr_text().unwrap_or_default().to_string(),
    }))
}
