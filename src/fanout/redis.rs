//! Redis `PUBLISH` fan-out.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

use super::FanoutPublisher;
use crate::error::RelayError;

/// Publishes `{"event", "data"}` JSON messages to Redis channels.
///
/// The connection is opened on first publish and re-established by the
/// [`ConnectionManager`] after failures.
pub struct RedisPublisher {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
}

impl std::fmt::Debug for RedisPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPublisher")
            .field("connected", &self.conn.initialized())
            .finish_non_exhaustive()
    }
}

impl RedisPublisher {
    /// Creates a publisher for `url` without connecting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] for malformed URLs.
    pub fn new(url: &str) -> Result<Self, RelayError> {
        let client = redis::Client::open(url)
            .map_err(|e| RelayError::InvalidMetadata(format!("fanout url: {e}")))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, RelayError> {
        self.conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await
            .cloned()
            .map_err(|e| RelayError::Publish(e.to_string()))
    }
}

#[async_trait]
impl FanoutPublisher for RedisPublisher {
    async fn publish(&self, topic: &str, event: &str, data: &serde_json::Value) -> Result<(), RelayError> {
        let payload = serde_json::json!({ "event": event, "data": data }).to_string();
        let mut conn = self.connection().await?;
        let receivers: i64 = conn
            .publish(topic, payload)
            .await
            .map_err(|e| RelayError::Publish(e.to_string()))?;
        tracing::debug!(topic, event, receivers, "published to redis");
        Ok(())
    }
}
