//! Channel registration handlers: register, get, update.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::{base_url, parse_optional_json};
use crate::api::dto::ChannelResponse;
use crate::app_state::AppState;
use crate::domain::{ChannelId, ChannelMetadata};
use crate::error::{ErrorResponse, RelayError};

fn parse_id(raw: &str) -> Result<ChannelId, RelayError> {
    raw.parse()
        .map_err(|_| RelayError::InvalidRequest(format!("invalid channel id: {raw}")))
}

/// `POST /webhook/channels`: Register a webhook channel.
///
/// # Errors
///
/// Returns [`RelayError::InvalidMetadata`] for malformed or invalid
/// metadata.
#[utoipa::path(
    post,
    path = "/api/v1/webhook/channels",
    tag = "Channels",
    summary = "Register a webhook channel",
    description = "Creates a channel with optional relay metadata (defer, signature, telemetry, fanout) and returns its callback URL. An empty body registers a channel without metadata.",
    request_body(content = Option<ChannelMetadata>, description = "Channel metadata"),
    responses(
        (status = 201, description = "Channel registered", body = ChannelResponse),
        (status = 400, description = "Invalid metadata", body = ErrorResponse),
    )
)]
pub async fn create_channel(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    let metadata: Option<ChannelMetadata> = parse_optional_json(&body, RelayError::InvalidMetadata)?;
    let channel = state.relay.register_channel(metadata).await?;
    let response = ChannelResponse::new(channel, &base_url(&state, &headers));
    tracing::info!(channel_id = %response.id, callback_url = %response.callback_url, "registered webhook channel");
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /webhook/channels/{id}`: Get a channel.
///
/// # Errors
///
/// Returns [`RelayError::ChannelNotFound`] if the channel does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/webhook/channels/{id}",
    tag = "Channels",
    summary = "Get a webhook channel",
    description = "Returns the channel and extends its expiration.",
    params(
        ("id" = uuid::Uuid, Path, description = "Channel UUID"),
    ),
    responses(
        (status = 200, description = "Channel", body = ChannelResponse),
        (status = 400, description = "Malformed id", body = ErrorResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RelayError> {
    let channel = state.relay.get_channel(parse_id(&id)?).await?;
    Ok(Json(ChannelResponse::new(channel, &base_url(&state, &headers))))
}

/// `PATCH /webhook/channels/{id}`: Merge-update channel metadata.
///
/// # Errors
///
/// Returns [`RelayError::ChannelNotFound`] if the channel does not exist
/// or [`RelayError::InvalidMetadata`] for invalid metadata.
#[utoipa::path(
    patch,
    path = "/api/v1/webhook/channels/{id}",
    tag = "Channels",
    summary = "Update a webhook channel",
    description = "Overlays the provided metadata fields onto the channel's current metadata.",
    params(
        ("id" = uuid::Uuid, Path, description = "Channel UUID"),
    ),
    request_body = ChannelMetadata,
    responses(
        (status = 200, description = "Updated channel", body = ChannelResponse),
        (status = 400, description = "Invalid metadata", body = ErrorResponse),
        (status = 404, description = "Channel not found", body = ErrorResponse),
    )
)]
pub async fn update_channel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    let id = parse_id(&id)?;
    let patch: ChannelMetadata =
        parse_optional_json(&body, RelayError::InvalidMetadata)?.unwrap_or_default();
    let channel = state.relay.update_channel(id, patch).await?;
    Ok(Json(ChannelResponse::new(channel, &base_url(&state, &headers))))
}

/// Channel routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhook/channels", post(create_channel))
        .route(
            "/webhook/channels/{id}",
            get(get_channel).patch(update_channel),
        )
}
