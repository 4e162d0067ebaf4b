//! Data Transfer Objects for REST request/response serialization.
//!
//! JSON field names are camelCase to match the webhook senders and
//! browser clients the relay serves.

pub mod channel_dto;
pub mod common_dto;
pub mod presentation_dto;

pub use channel_dto::*;
pub use common_dto::*;
pub use presentation_dto::*;
