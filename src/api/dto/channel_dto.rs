//! Channel registration DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Channel, ChannelId, ChannelMetadata};

/// A channel plus the URL senders should deliver webhooks to.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    /// Channel identifier.
    pub id: ChannelId,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Relay policy, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChannelMetadata>,
    /// Public ingress URL for this channel.
    pub callback_url: String,
}

impl ChannelResponse {
    /// Builds the response for `channel` relative to `base_url`.
    #[must_use]
    pub fn new(channel: Channel, base_url: &str) -> Self {
        let callback_url = format!("{base_url}/api/v1/webhook/events/{}", channel.id);
        Self {
            id: channel.id,
            created_at: channel.created_at,
            metadata: channel.metadata,
            callback_url,
        }
    }
}
