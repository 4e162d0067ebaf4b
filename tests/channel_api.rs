//! Router-level tests for channel registration, health and API docs.

#![allow(clippy::panic)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use webhook_relay::api::build_app;
use webhook_relay::app_state::AppState;
use webhook_relay::config::RelayConfig;
use webhook_relay::store::MemoryStore;

fn app() -> Router {
    build_app(AppState::with_store(
        RelayConfig::default(),
        Arc::new(MemoryStore::new()),
    ))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", "relay.test")
        .header("content-type", "application/json");
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
    let Ok(request) = request.body(body) else {
        panic!("request should build");
    };
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router is infallible");
    };
    let status = response.status();
    let Ok(collected) = response.into_body().collect().await else {
        panic!("body should be readable");
    };
    let bytes = collected.to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn str_field<'a>(json: &'a Value, key: &str) -> &'a str {
    json.get(key).and_then(Value::as_str).unwrap_or_default()
}

#[tokio::test]
async fn register_without_metadata() {
    let app = app();
    let (status, json) = send(&app, "POST", "/api/v1/webhook/channels", None).await;
    assert_eq!(status, StatusCode::CREATED);

    let id = str_field(&json, "id");
    assert!(id.parse::<uuid::Uuid>().is_ok());
    assert_eq!(
        str_field(&json, "callbackUrl"),
        format!("http://relay.test/api/v1/webhook/events/{id}")
    );
    assert!(json.get("metadata").is_none());
    assert!(json.get("createdAt").is_some());
}

#[tokio::test]
async fn register_with_metadata_normalizes_defer() {
    let app = app();
    let (status, json) = send(
        &app,
        "POST",
        "/api/v1/webhook/channels",
        Some(json!({ "defer": "1.5s", "fanout": { "kind": "local" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json.pointer("/metadata/defer"), Some(&json!(1500)));
    assert_eq!(json.pointer("/metadata/fanout/kind"), Some(&json!("local")));
}

#[tokio::test]
async fn invalid_metadata_is_rejected() {
    let app = app();
    for metadata in [
        json!({ "defer": "6s" }),
        json!({ "defer": "soon" }),
        json!({ "unknown": true }),
        json!({ "telemetry": { "url": "ftp://influx", "org": "o", "bucket": "b" } }),
        json!({ "signature": { "jwks": [{ "kty": "RSA", "crv": "-", "x": "AA", "kid": "k" }] } }),
    ] {
        let (status, json) =
            send(&app, "POST", "/api/v1/webhook/channels", Some(metadata.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{metadata}");
        assert_eq!(json.pointer("/error/code"), Some(&json!(1002)), "{metadata}");
    }
}

#[tokio::test]
async fn get_and_patch_channel() {
    let app = app();
    let (_, created) = send(
        &app,
        "POST",
        "/api/v1/webhook/channels",
        Some(json!({ "defer": 200, "fanout": { "kind": "local" } })),
    )
    .await;
    let id = str_field(&created, "id").to_string();
    let path = format!("/api/v1/webhook/channels/{id}");

    let (status, fetched) = send(&app, "GET", &path, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched.get("metadata"), created.get("metadata"));

    let (status, patched) = send(&app, "PATCH", &path, Some(json!({ "defer": "2s" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched.pointer("/metadata/defer"), Some(&json!(2000)));
    assert_eq!(patched.pointer("/metadata/fanout/kind"), Some(&json!("local")));
    assert_eq!(str_field(&patched, "id"), id);
}

#[tokio::test]
async fn unknown_and_malformed_channel_ids() {
    let app = app();
    let (status, json) = send(
        &app,
        "GET",
        "/api/v1/webhook/channels/2c1f4a5e-8d1b-4a3a-9a55-0d7c1c1d2e3f",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json.pointer("/error/code"), Some(&json!(2001)));

    let (status, _) = send(&app, "GET", "/api/v1/webhook/channels/nope", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        "PATCH",
        "/api/v1/webhook/channels/2c1f4a5e-8d1b-4a3a-9a55-0d7c1c1d2e3f",
        Some(json!({ "defer": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn public_url_overrides_host() {
    let config = RelayConfig {
        public_url: Some("https://hooks.example.com".to_string()),
        ..RelayConfig::default()
    };
    let app = build_app(AppState::with_store(config, Arc::new(MemoryStore::new())));
    let (_, json) = send(&app, "POST", "/api/v1/webhook/channels", None).await;
    assert!(
        str_field(&json, "callbackUrl").starts_with("https://hooks.example.com/api/v1/webhook/events/")
    );
}

#[tokio::test]
async fn health_and_openapi() {
    let app = app();
    let (status, json) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(str_field(&json, "status"), "healthy");

    let (status, doc) = send(&app, "GET", "/api-docs/openapi.json", None).await;
    assert_eq!(status, StatusCode::OK);
    let Some(paths) = doc.get("paths").and_then(Value::as_object) else {
        panic!("openapi paths expected");
    };
    assert!(paths.contains_key("/api/v1/webhook/channels"));
    assert!(paths.contains_key("/api/v1/webhook/events/{channel_id}"));
    assert!(paths.contains_key("/api/v1/webhook/presentations/{id}"));
}
