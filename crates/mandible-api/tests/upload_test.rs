//! Upload API integration tests.
//!
//! Run with: `cargo test -p mandible-api --test upload_test`
//!
//! These exercise the HTTP surface against an in-memory store with the
//! passthrough strategy, so no external image tooling is needed.

use std::sync::Arc;

use axum_test::TestServer;
use chrono::Utc;
use mandible_api::auth::{sign_grant, AuthenticatedUser, HmacAuthenticator};
use mandible_api::stats::NoopStats;
use mandible_api::{build_router, AppState};
use mandible_core::Config;
use mandible_processing::strategies;
use mandible_storage::{read_all, ImageStore, InMemoryStore, StoreObject};
use serde_json::Value;

/// 1x1 transparent GIF, 42 bytes decoded.
const GIF_B64: &str = "R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";
const HMAC_KEY: &[u8] = b"foobar";

fn test_app() -> (TestServer, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let state = AppState::new(
        Config::test_default(),
        store.clone(),
        strategies::passthrough(),
        Arc::new(HmacAuthenticator::new(HMAC_KEY)),
        None,
        Arc::new(NoopStats),
    );
    let server = TestServer::new(build_router(Arc::new(state))).unwrap();
    (server, store)
}

fn signed_grant_headers(user_id: &str) -> (String, String) {
    let grant = serde_json::to_string(&AuthenticatedUser {
        user_id: user_id.to_string(),
        grant_time: Some(Utc::now()),
        grant_duration_sec: 31_536_000,
    })
    .unwrap();
    let mac = sign_grant(HMAC_KEY, grant.as_bytes());
    (grant, mac)
}

#[tokio::test]
async fn welcome_page_is_served() {
    let (server, _store) = test_app();

    let response = server.get("/").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("up and running"));
}

#[tokio::test]
async fn base64_upload_round_trips_through_the_store() {
    let (server, store) = test_app();

    let response = server
        .post("/base64")
        .form(&serde_json::json!({ "image": GIF_B64 }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], 200);
    assert_eq!(body["success"], true);

    let data = &body["data"];
    assert_eq!(data["mime"], "image/gif");
    assert_eq!(data["width"], 1);
    assert_eq!(data["height"], 1);
    assert_eq!(data["size"], 42);
    assert_eq!(data["user_id"], "");
    assert_eq!(data["ocrtext"], "");

    let hash = data["hash"].as_str().unwrap();
    assert_eq!(hash.len(), 7);
    assert!(hash.bytes().all(|b| b.is_ascii_alphanumeric()));
    assert_eq!(data["link"], format!("memory://{}", hash));

    // the stored bytes are exactly the decoded upload
    let obj = StoreObject::original(hash, "image/gif");
    assert!(store.exists(&obj).await.unwrap());
    let stored = read_all(store.get(&obj).await.unwrap()).await.unwrap();
    assert_eq!(stored.len(), 42);
    assert!(stored.starts_with(b"GIF89a"));
}

#[tokio::test]
async fn data_uri_prefix_is_tolerated() {
    let (server, _store) = test_app();

    let response = server
        .post("/base64")
        .form(&serde_json::json!({ "image": format!("data:image/gif;base64,{}", GIF_B64) }))
        .await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn multipart_file_upload_works() {
    let (server, store) = test_app();

    use axum_test::multipart::{MultipartForm, Part};
    use base64::Engine;

    let gif = base64::engine::general_purpose::STANDARD
        .decode(GIF_B64)
        .unwrap();
    let part = Part::bytes(gif).file_name("pixel.gif").mime_type("image/gif");
    let form = MultipartForm::new().add_part("image", part);

    let response = server.post("/file").multipart(form).await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["data"]["name"], "pixel.gif");

    let hash = body["data"]["hash"].as_str().unwrap();
    let obj = StoreObject::original(hash, "image/gif");
    assert!(store.exists(&obj).await.unwrap());
}

#[tokio::test]
async fn unsupported_content_is_rejected() {
    let (server, _store) = test_app();

    use base64::Engine;
    let not_an_image = base64::engine::general_purpose::STANDARD.encode(b"hello world");

    let response = server
        .post("/base64")
        .form(&serde_json::json!({ "image": not_an_image }))
        .await;
    assert_eq!(response.status_code(), 400);

    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unsupported file type!");
}

#[tokio::test]
async fn invalid_thumb_json_is_a_bad_request() {
    let (server, _store) = test_app();

    let response = server
        .post("/base64")
        .form(&serde_json::json!({ "image": GIF_B64, "thumbs": "{nope" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let body: Value = response.json();
    assert_eq!(body["error"], "Error parsing thumbnail JSON!");
}

#[tokio::test]
async fn invalid_base64_is_a_bad_request() {
    let (server, _store) = test_app();

    let response = server
        .post("/base64")
        .form(&serde_json::json!({ "image": "!!! not base64 !!!" }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn authenticated_upload_binds_the_user() {
    let (server, _store) = test_app();

    let (grant, mac) = signed_grant_headers("123");
    let response = server
        .post("/user/123/base64")
        .add_header("Authorization", grant)
        .add_header("X-Authorization-HMAC", mac)
        .form(&serde_json::json!({ "image": GIF_B64 }))
        .await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["data"]["user_id"], "123");
}

#[tokio::test]
async fn grant_for_another_user_is_unauthorized() {
    let (server, _store) = test_app();

    let (grant, mac) = signed_grant_headers("124");
    let response = server
        .post("/user/123/base64")
        .add_header("Authorization", grant)
        .add_header("X-Authorization-HMAC", mac)
        .form(&serde_json::json!({ "image": GIF_B64 }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn missing_auth_headers_are_unauthorized() {
    let (server, _store) = test_app();

    let response = server
        .post("/user/123/base64")
        .form(&serde_json::json!({ "image": GIF_B64 }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn tampered_hmac_is_unauthorized() {
    let (server, _store) = test_app();

    let (grant, _mac) = signed_grant_headers("123");
    let wrong_mac = sign_grant(b"wrong-key", grant.as_bytes());
    let response = server
        .post("/user/123/base64")
        .add_header("Authorization", grant)
        .add_header("X-Authorization-HMAC", wrong_mac)
        .form(&serde_json::json!({ "image": GIF_B64 }))
        .await;
    assert_eq!(response.status_code(), 401);
}

#[tokio::test]
async fn thumbnail_for_unknown_uid_is_not_found() {
    let (server, _store) = test_app();

    let response = server
        .post("/thumbnail")
        .form(&serde_json::json!({
            "uid": "zzzzzzz",
            "thumbs": r#"{"small": {"shape": "thumb", "width": 90, "height": 90}}"#
        }))
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn thumbnail_requires_exactly_one_thumb() {
    let (server, _store) = test_app();

    let response = server
        .post("/thumbnail")
        .form(&serde_json::json!({ "uid": "zzzzzzz", "thumbs": "{}" }))
        .await;
    assert_eq!(response.status_code(), 400);

    let body: Value = response.json();
    assert_eq!(body["error"], "Wrong number of thumbnails, expected 1");
}

#[tokio::test]
async fn ocr_for_unknown_uid_is_a_bad_request() {
    let (server, _store) = test_app();

    let response = server
        .post("/ocr")
        .form(&serde_json::json!({ "uid": "zzzzzzz" }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn ocr_requires_a_uid() {
    let (server, _store) = test_app();

    let response = server.post("/ocr").form(&serde_json::json!({})).await;
    assert_eq!(response.status_code(), 400);

    let body: Value = response.json();
    assert_eq!(body["error"], "Image ID must be passed as \"uid\"");
}

#[tokio::test]
async fn pipeline_failure_maps_to_a_terse_500() {
    let store = Arc::new(InMemoryStore::new());
    let failing: mandible_processing::ProcessorStrategy = Arc::new(|_config, _image| {
        Err(mandible_processing::ProcessError::Stage(
            "convert segfaulted".to_string(),
        ))
    });
    let state = AppState::new(
        Config::test_default(),
        store,
        failing,
        Arc::new(HmacAuthenticator::new(HMAC_KEY)),
        None,
        Arc::new(NoopStats),
    );
    let server = TestServer::new(build_router(Arc::new(state))).unwrap();

    let response = server
        .post("/base64")
        .form(&serde_json::json!({ "image": GIF_B64 }))
        .await;
    assert_eq!(response.status_code(), 500);

    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unable to process image!");
}

#[tokio::test]
async fn hashes_are_unique_across_uploads() {
    let (server, _store) = test_app();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..5 {
        let response = server
            .post("/base64")
            .form(&serde_json::json!({ "image": GIF_B64 }))
            .await;
        assert_eq!(response.status_code(), 200);
        let body: Value = response.json();
        let hash = body["data"]["hash"].as_str().unwrap().to_string();
        assert!(seen.insert(hash), "hash generator repeated an id");
    }
}
