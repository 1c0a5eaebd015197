//! Runtime stats seam.
//!
//! The metrics backend is deployment glue; the service only needs somewhere
//! to report request, upload and error counts. The shipped impls are a
//! no-op and a tracing-backed logger.

use std::time::Duration;

pub trait Stats: Send + Sync {
    fn request(&self, path: &str);
    fn upload(&self, kind: &str);
    fn thumbnail(&self, name: &str);
    fn error(&self, status: u16);
    fn response_time(&self, path: &str, elapsed: Duration);
}

pub struct NoopStats;

impl Stats for NoopStats {
    fn request(&self, _path: &str) {}
    fn upload(&self, _kind: &str) {}
    fn thumbnail(&self, _name: &str) {}
    fn error(&self, _status: u16) {}
    fn response_time(&self, _path: &str, _elapsed: Duration) {}
}

pub struct LogStats;

impl Stats for LogStats {
    fn request(&self, path: &str) {
        tracing::debug!(path = %path, "request");
    }

    fn upload(&self, kind: &str) {
        tracing::debug!(kind = %kind, "upload");
    }

    fn thumbnail(&self, name: &str) {
        tracing::debug!(name = %name, "thumbnail generated");
    }

    fn error(&self, status: u16) {
        tracing::debug!(status = status, "error response");
    }

    fn response_time(&self, path: &str, elapsed: Duration) {
        tracing::debug!(path = %path, elapsed_ms = elapsed.as_millis() as u64, "request served");
    }
}
