//! Presentation callbacks: store and fetch.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::parse_optional_json;
use crate::api::dto::PresentationStoredResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, RelayError};
use crate::store::PresentationRecord;

/// `POST /webhook/presentations`: Receive a presentation callback.
///
/// # Errors
///
/// Returns [`RelayError::InvalidRequest`] if the body is not JSON or
/// [`RelayError::Store`] if it cannot be saved.
#[utoipa::path(
    post,
    path = "/api/v1/webhook/presentations",
    tag = "Presentations",
    summary = "Receive a presentation callback",
    description = "Stores a recognized presentation body for five minutes under its scheme-derived id. Unrecognized bodies are acknowledged and dropped.",
    request_body(content = serde_json::Value, description = "Presentation payload"),
    responses(
        (status = 200, description = "Acknowledged", body = PresentationStoredResponse),
        (status = 400, description = "Body is not JSON", body = ErrorResponse),
    )
)]
pub async fn post_presentation(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, RelayError> {
    let body: serde_json::Value = parse_optional_json(&body, RelayError::InvalidRequest)?
        .unwrap_or(serde_json::Value::Null);
    let record = state.relay.store_presentation(body).await?;
    Ok(Json(PresentationStoredResponse {
        status: "Ok".to_string(),
        id: record.map(|r| r.id),
    }))
}

/// `GET /webhook/presentations/{id}`: Fetch a stored presentation.
///
/// # Errors
///
/// Returns [`RelayError::PresentationNotFound`] if absent or expired.
#[utoipa::path(
    get,
    path = "/api/v1/webhook/presentations/{id}",
    tag = "Presentations",
    summary = "Get a presentation",
    params(
        ("id" = String, Path, description = "Presentation id (challenge id)"),
    ),
    responses(
        (status = 200, description = "Stored presentation", body = PresentationRecord),
        (status = 404, description = "Presentation not found", body = ErrorResponse),
    )
)]
pub async fn get_presentation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RelayError> {
    Ok(Json(state.relay.find_presentation(&id).await?))
}

/// Presentation routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/webhook/presentations", post(post_presentation))
        .route("/webhook/presentations/{id}", get(get_presentation))
}
