//! Public webhook ingress.
//!
//! Always acknowledges with `200 {"status":"Ok"}`: senders must not learn
//! whether a channel exists or a signature verified. These routes carry no
//! axum body limit and sit outside the global timeout; bodies are read here
//! under [`RelayConfig::ingress_body_limit`](crate::config::RelayConfig)
//! and a body that cannot be read is acknowledged and dropped.

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, OriginalUri, Path, State};
use axum::http::{HeaderMap, Method};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::StatusResponse;
use crate::app_state::AppState;
use crate::domain::channel::MAX_DEFER;
use crate::service::InboundEvent;
use crate::signature::SignedRequest;

/// `POST /webhook/events`: Receive a webhook without a channel.
#[utoipa::path(
    post,
    path = "/api/v1/webhook/events",
    tag = "Webhooks",
    summary = "Receive a webhook event",
    description = "Public ingress for senders without a channel. The event is logged and acknowledged.",
    request_body(content = serde_json::Value, description = "Webhook payload"),
    responses(
        (status = 200, description = "Acknowledged", body = StatusResponse),
    )
)]
pub async fn post_event(
    State(state): State<AppState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Body,
) -> Json<StatusResponse> {
    relay(&state, None, method, &uri, headers, body).await
}

/// `POST /webhook/events/{channel_id}`: Receive a webhook for a channel.
#[utoipa::path(
    post,
    path = "/api/v1/webhook/events/{channel_id}",
    tag = "Webhooks",
    summary = "Receive a webhook event for a channel",
    description = "Public ingress. Verifies the signature, records telemetry, fans out and defers the response according to the channel's metadata. Always acknowledged.",
    params(
        ("channel_id" = String, Path, description = "Channel UUID"),
    ),
    request_body(content = serde_json::Value, description = "Webhook payload"),
    responses(
        (status = 200, description = "Acknowledged", body = StatusResponse),
    )
)]
pub async fn post_channel_event(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Body,
) -> Json<StatusResponse> {
    relay(&state, Some(channel_id), method, &uri, headers, body).await
}

/// Reads the whole body within the configured size and time limits.
async fn read_body(state: &AppState, body: Body) -> Option<Bytes> {
    let limit = state.config.ingress_body_limit;
    match tokio::time::timeout(state.config.request_timeout, axum::body::to_bytes(body, limit))
        .await
    {
        Ok(Ok(bytes)) => Some(bytes),
        Ok(Err(e)) => {
            tracing::warn!(limit, error = %e, "webhook body dropped");
            None
        }
        Err(_) => {
            tracing::warn!("webhook body read timed out");
            None
        }
    }
}

async fn relay(
    state: &AppState,
    channel_id: Option<String>,
    method: Method,
    uri: &axum::http::Uri,
    headers: HeaderMap,
    body: Body,
) -> Json<StatusResponse> {
    let Some(body) = read_body(state, body).await else {
        return Json(StatusResponse::ok());
    };
    let parsed = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    let event = InboundEvent {
        channel_id,
        request: SignedRequest::new(method, uri, headers, body),
        body: parsed,
        received_at: Utc::now(),
    };
    let cancel = state.shutdown.child_token();
    let budget = state.config.request_timeout.saturating_add(MAX_DEFER);
    let Ok(outcome) = tokio::time::timeout(budget, state.relay.handle_event(&event, &cancel)).await
    else {
        tracing::warn!(channel_id = ?event.channel_id, "webhook relay timed out");
        return Json(StatusResponse::ok());
    };
    tracing::debug!(
        channel_id = ?outcome.channel_id,
        scheme = outcome.scheme.unwrap_or("none"),
        verified = ?outcome.verification.as_ref().map(|v| v.verified),
        telemetry = outcome.telemetry_submitted,
        fanout = outcome.fanout_published,
        "webhook event relayed"
    );
    Json(StatusResponse::ok())
}

/// Webhook ingress routes, without axum's default body limit.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhook/events", post(post_event))
        .route("/webhook/events/{channel_id}", post(post_channel_event))
        .layer(DefaultBodyLimit::disable())
}
