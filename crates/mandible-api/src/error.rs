//! HTTP error conversion.
//!
//! `AppError` lives in mandible-core; the orphan rule keeps us from
//! implementing `IntoResponse` for it directly, so handlers return this
//! newtype. Conversion logs the detail and renders the terse envelope.

use axum::response::{IntoResponse, Response};
use mandible_core::AppError;

use crate::response::failure;

#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        if status >= 500 {
            tracing::error!(status = status, error = %self.0, "HTTP error");
        } else {
            tracing::warn!(status = status, error = %self.0, "HTTP error");
        }
        failure(status, self.0.to_string())
    }
}
