//! REST endpoint handlers organized by resource.

pub mod channel;
pub mod event;
pub mod presentation;
pub mod system;

use axum::Router;
use axum::body::Bytes;
use axum::http::HeaderMap;
use serde::de::DeserializeOwned;

use crate::app_state::AppState;
use crate::error::RelayError;

/// Composes the management routes mounted under `/api/v1`. Webhook
/// ingress is mounted separately by [`build_app`](crate::api::build_app).
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(channel::routes())
        .merge(presentation::routes())
}

/// Parses an optional JSON body. An empty body yields `None`.
///
/// Parsing by hand keeps malformed bodies on the 400 error path instead of
/// axum's 422 rejection.
fn parse_optional_json<T: DeserializeOwned>(
    body: &Bytes,
    invalid: fn(String) -> RelayError,
) -> Result<Option<T>, RelayError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| invalid(e.to_string()))
}

/// Base URL for links handed back to clients.
///
/// Uses the configured public URL, else `x-forwarded-proto` and `host`.
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(url) = &state.config.public_url {
        return url.clone();
    }
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header("x-forwarded-proto").unwrap_or("http");
    let host = header("x-forwarded-host")
        .or_else(|| header("host"))
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}
