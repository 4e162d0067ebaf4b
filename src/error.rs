//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for the relay. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! The public ingress route never returns it; only the registration and
//! retrieval routes do.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "channel not found: 1b4e28ba-2fa1-11d2-883f-0016d3cca427",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request           |
/// | 2000–2999 | Not Found       | 404 Not Found             |
/// | 3000–3999 | Collaborator    | 500 / 502                 |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Request body or parameters could not be parsed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Channel metadata failed validation.
    #[error("invalid channel metadata: {0}")]
    InvalidMetadata(String),

    /// Channel with the given ID was not found (never existed or expired).
    #[error("channel not found: {0}")]
    ChannelNotFound(uuid::Uuid),

    /// Presentation with the given ID was not found (never existed or expired).
    #[error("presentation not found: {0}")]
    PresentationNotFound(String),

    /// Key-value store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Fan-out publisher failure.
    #[error("publish error: {0}")]
    Publish(String),

    /// Telemetry writer failure.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidMetadata(_) => 1002,
            Self::ChannelNotFound(_) => 2001,
            Self::PresentationNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Store(_) => 3001,
            Self::Publish(_) => 3002,
            Self::Telemetry(_) => 3003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidMetadata(_) => StatusCode::BAD_REQUEST,
            Self::ChannelNotFound(_) | Self::PresentationNotFound(_) => StatusCode::NOT_FOUND,
            Self::Publish(_) | Self::Telemetry(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        Self::Store(err.to_string())
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = RelayError::InvalidMetadata("defer too long".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), 1002);
    }

    #[test]
    fn not_found_errors_map_to_404() {
        let err = RelayError::PresentationNotFound("abc".to_string());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err = RelayError::ChannelNotFound(uuid::Uuid::new_v4());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn into_response_sets_status() {
        let response = RelayError::Store("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
