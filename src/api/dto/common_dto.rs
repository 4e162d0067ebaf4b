//! Shared DTO types used across multiple endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Acknowledgement returned by the public webhook endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    /// Always `"Ok"`.
    #[schema(example = "Ok")]
    pub status: String,
}

impl StatusResponse {
    /// The success acknowledgement.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: "Ok".to_string(),
        }
    }
}
