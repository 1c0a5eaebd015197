//! Byte-source extraction for the three upload channels.
//!
//! Each channel ends in the same place: raw bytes plus a best-effort
//! filename, handed to the upload controller.

use axum::extract::Multipart;
use base64::Engine;
use bytes::Bytes;
use mandible_core::AppError;

/// Pull the `image` file and optional `thumbs` JSON out of a multipart
/// form.
pub async fn from_multipart(
    mut multipart: Multipart,
) -> Result<(Bytes, String, Option<String>), AppError> {
    let mut image: Option<(Bytes, String)> = None;
    let mut thumbs: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Error processing file: {}", e)))?
    {
        match field.name() {
            Some("image") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Error processing file: {}", e)))?;
                image = Some((data, filename));
            }
            Some("thumbs") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Error processing file: {}", e)))?;
                thumbs = Some(text);
            }
            _ => {}
        }
    }

    let (data, filename) =
        image.ok_or_else(|| AppError::BadRequest("Error processing file".to_string()))?;
    Ok((data, filename, thumbs))
}

/// Fetch a remote image with the configured User-Agent.
pub async fn download(
    client: &reqwest::Client,
    user_agent: &str,
    url: &str,
) -> Result<(Bytes, String), AppError> {
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, user_agent)
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(url = %url, error = %e, "remote download failed");
            AppError::BadRequest("Error downloading URL!".to_string())
        })?;

    if response.status().as_u16() != 200 {
        tracing::warn!(url = %url, status = %response.status(), "non-200 from remote host");
        return Err(AppError::BadRequest("Error downloading URL!".to_string()));
    }

    let data = response
        .bytes()
        .await
        .map_err(|_| AppError::BadRequest("Error downloading URL!".to_string()))?;

    if data.is_empty() {
        return Err(AppError::BadRequest("Empty file received".to_string()));
    }

    let filename = url
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .split('?')
        .next()
        .unwrap_or_default()
        .to_string();

    Ok((data, filename))
}

/// Decode a base64 form value, tolerating a data-URI prefix up to the
/// first comma.
pub fn decode_base64(input: &str) -> Result<Bytes, AppError> {
    let payload = match input.split_once(',') {
        Some((_, rest)) => rest,
        None => input,
    };

    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map(Bytes::from)
        .map_err(|_| AppError::BadRequest("Error decoding base64 image!".to_string()))
}
