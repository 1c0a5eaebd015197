//! The response envelope.
//!
//! Every endpoint answers `{"status": n, "success": bool, ...}` with either
//! `data` or a top-level `error`. `success` is computed from the status so
//! the two can never disagree.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: u16,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn success<T: Serialize>(data: T) -> Response {
    let envelope = Envelope {
        status: 200,
        success: true,
        data: Some(data),
        error: None,
    };
    (StatusCode::OK, Json(envelope)).into_response()
}

pub fn failure(status: u16, message: impl Into<String>) -> Response {
    let envelope = Envelope::<()> {
        status,
        success: status == 200,
        data: None,
        error: Some(message.into()),
    };
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, Json(envelope)).into_response()
}

/// Payload for a completed upload.
#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub link: String,
    pub mime: String,
    pub name: String,
    pub hash: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub ocrtext: String,
    pub thumbs: BTreeMap<String, String>,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, f32>>,
}

#[derive(Debug, Serialize)]
pub struct OcrResponse {
    pub hash: String,
    pub ocrtext: String,
}
