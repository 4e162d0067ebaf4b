//! Typed repositories over a [`KeyValueStore`].

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::KeyValueStore;
use crate::domain::{Channel, ChannelId};
use crate::error::RelayError;

/// Default channel lifetime, refreshed on every read (5 days).
pub const DEFAULT_CHANNEL_TTL_SECS: u64 = 5 * 24 * 60 * 60;

/// Default presentation lifetime (5 minutes).
pub const DEFAULT_PRESENTATION_TTL_SECS: u64 = 300;

fn decode<T: for<'de> Deserialize<'de>>(key: &str, bytes: &[u8]) -> Result<T, RelayError> {
    serde_json::from_slice(bytes).map_err(|e| RelayError::Store(format!("corrupt record {key}: {e}")))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, RelayError> {
    serde_json::to_vec(value).map_err(|e| RelayError::Internal(e.to_string()))
}

/// Channels stored as `channel:<id>` with a sliding expiration.
#[derive(Debug, Clone)]
pub struct ChannelRepository {
    store: Arc<dyn KeyValueStore>,
    ttl_secs: u64,
}

impl ChannelRepository {
    /// Creates a repository whose channels live `ttl_secs` past last use.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    fn key(id: &ChannelId) -> String {
        format!("channel:{id}")
    }

    /// Writes `channel`, resetting its expiration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on store failure.
    pub async fn save(&self, channel: &Channel) -> Result<(), RelayError> {
        self.store
            .set(&Self::key(&channel.id), encode(channel)?, self.ttl_secs)
            .await
    }

    /// Loads a channel and extends its lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on store failure or undecodable data.
    pub async fn find(&self, id: &ChannelId) -> Result<Option<Channel>, RelayError> {
        let key = Self::key(id);
        let Some(bytes) = self.store.get(&key).await? else {
            return Ok(None);
        };
        self.store.expire(&key, self.ttl_secs).await?;
        decode(&key, &bytes).map(Some)
    }
}

/// A stored presentation callback body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresentationRecord {
    /// Scheme-derived id (e.g. a challenge id).
    pub id: String,
    /// Receive time in milliseconds since the epoch.
    pub received_at: i64,
    /// Original body.
    pub data: serde_json::Value,
}

/// Presentations stored as `presentation:<id>` with a fixed expiration.
#[derive(Debug, Clone)]
pub struct PresentationRepository {
    store: Arc<dyn KeyValueStore>,
    ttl_secs: u64,
}

impl PresentationRepository {
    /// Creates a repository whose records expire after `ttl_secs`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_secs: u64) -> Self {
        Self { store, ttl_secs }
    }

    fn key(id: &str) -> String {
        format!("presentation:{id}")
    }

    /// Stores `data` under `id`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on store failure.
    pub async fn insert(&self, id: &str, data: serde_json::Value) -> Result<PresentationRecord, RelayError> {
        let record = PresentationRecord {
            id: id.to_string(),
            received_at: Utc::now().timestamp_millis(),
            data,
        };
        self.store
            .set(&Self::key(id), encode(&record)?, self.ttl_secs)
            .await?;
        Ok(record)
    }

    /// Loads the record under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on store failure or undecodable data.
    pub async fn find(&self, id: &str) -> Result<Option<PresentationRecord>, RelayError> {
        let key = Self::key(id);
        match self.store.get(&key).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }
}
