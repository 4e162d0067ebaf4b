//! Presentation callback DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Acknowledgement for a presentation callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PresentationStoredResponse {
    /// Always `"Ok"`.
    #[schema(example = "Ok")]
    pub status: String,
    /// Id the body was stored under; absent when no scheme recognized it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}
