//! Unified error type for the mandible service.
//!
//! Low-level errors (I/O, store backends, external tools) are wrapped with
//! operation context where they occur; this enum is the shape the HTTP layer
//! maps onto status codes. User-facing messages stay terse, the detail goes
//! to the logs.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The sniffed content type is not one of the supported image formats.
    #[error("Unsupported file type!")]
    UnsupportedMime,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    /// An external collaborator (store backend, processor tool, remote
    /// download) failed.
    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn status(&self) -> u16 {
        match self {
            AppError::UnsupportedMime | AppError::BadRequest(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::NotFound(_) => 404,
            AppError::Upstream(_) | AppError::Internal(_) => 500,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::BadRequest("x".into()).status(), 400);
        assert_eq!(AppError::Unauthorized("x".into()).status(), 401);
        assert_eq!(AppError::NotFound("x".into()).status(), 404);
        assert_eq!(AppError::Upstream("x".into()).status(), 500);
        assert_eq!(AppError::Internal("x".into()).status(), 500);
        assert_eq!(AppError::UnsupportedMime.status(), 400);
    }
}
