//! Application state and router assembly.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use mandible_core::Config;
use mandible_processing::ocr::Dictionary;
use mandible_processing::ProcessorStrategy;
use mandible_storage::{HashGenerator, ImageStore};
use tower_http::trace::TraceLayer;

use crate::auth::Authenticator;
use crate::handlers;
use crate::stats::Stats;

/// Request bodies above this are rejected outright.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ImageStore>,
    pub hash_generator: Arc<HashGenerator>,
    pub strategy: ProcessorStrategy,
    pub dictionary: Option<Arc<Dictionary>>,
    pub http: reqwest::Client,
    pub authenticator: Arc<dyn Authenticator>,
    pub stats: Arc<dyn Stats>,
}

impl AppState {
    /// Wire the state together; the hash generator's producer task starts
    /// here.
    pub fn new(
        config: Config,
        store: Arc<dyn ImageStore>,
        strategy: ProcessorStrategy,
        authenticator: Arc<dyn Authenticator>,
        dictionary: Option<Arc<Dictionary>>,
        stats: Arc<dyn Stats>,
    ) -> AppState {
        let hash_generator = Arc::new(HashGenerator::new(store.clone(), config.hash_length));

        AppState {
            config,
            store,
            hash_generator,
            strategy,
            dictionary,
            http: reqwest::Client::new(),
            authenticator,
            stats,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handlers::welcome))
        .route("/file", post(handlers::upload_file))
        .route("/url", post(handlers::upload_url))
        .route("/base64", post(handlers::upload_base64))
        .route("/user/{user_id}/file", post(handlers::user_upload_file))
        .route("/user/{user_id}/url", post(handlers::user_upload_url))
        .route("/user/{user_id}/base64", post(handlers::user_upload_base64))
        .route("/thumbnail", post(handlers::thumbnail))
        .route("/ocr", post(handlers::ocr))
        .layer(middleware::from_fn_with_state(state.clone(), track_requests))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Request/error counting around every route.
async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    state.stats.request(&path);

    let start = Instant::now();
    let response = next.run(request).await;
    state.stats.response_time(&path, start.elapsed());

    let status = response.status().as_u16();
    if status >= 400 {
        state.stats.error(status);
    }

    response
}
