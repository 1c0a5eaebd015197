use std::sync::Arc;

use mandible_api::auth::{Authenticator, HmacAuthenticator, PassthroughAuthenticator};
use mandible_api::stats::LogStats;
use mandible_api::{build_router, telemetry, AppState};
use mandible_core::Config;
use mandible_processing::ocr::Dictionary;
use mandible_processing::strategies;
use mandible_storage::{create_stores, ImageStore};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    telemetry::init();

    let config = Config::load()?;
    let store: Arc<dyn ImageStore> = create_stores(&config)?;

    let dictionary = if config.ocr_enabled {
        match Dictionary::load(&config.dictionary_path) {
            Ok(dictionary) => Some(Arc::new(dictionary)),
            Err(err) => {
                tracing::warn!(
                    path = %config.dictionary_path.display(),
                    error = %err,
                    "OCR dictionary unavailable; the token filter will only keep numbers"
                );
                Some(Arc::new(Dictionary::default()))
            }
        }
    } else {
        None
    };

    if config.labeling_enabled {
        tracing::warn!("labeling is enabled but this build ships no labeler; the stage is skipped");
    }

    let authenticator: Arc<dyn Authenticator> = match &config.auth_hmac_key {
        Some(key) => Arc::new(HmacAuthenticator::new(key.as_bytes())),
        None => Arc::new(PassthroughAuthenticator),
    };

    let strategy = strategies::everything(dictionary.clone(), None);
    let port = config.port;

    let state = Arc::new(AppState::new(
        config,
        store,
        strategy,
        authenticator,
        dictionary,
        Arc::new(LogStats),
    ));

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port = port, "mandible listening");
    axum::serve(listener, router).await?;

    Ok(())
}
