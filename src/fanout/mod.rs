//! Pub/sub fan-out of relayed webhook events.
//!
//! A channel's [`FanoutTarget`] selects where verified events go: a Redis
//! server (`PUBLISH`) or the relay's own [`LocalBus`], which feeds the
//! `/ws` WebSocket endpoint. Publishers are pooled per target.

pub mod local;
pub mod redis;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{PoolFactory, ResourcePool};
use crate::error::RelayError;

pub use local::{LocalBus, TopicReceiver};
pub use self::redis::RedisPublisher;

/// Pool of publishers keyed by target.
pub type FanoutPool = ResourcePool<FanoutTarget, Arc<dyn FanoutPublisher>>;

/// Where a channel's events are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FanoutTarget {
    /// A Redis server reached at `url`.
    Redis {
        /// Connection URL, e.g. `redis://127.0.0.1:6379`.
        url: String,
    },
    /// The in-process [`LocalBus`] behind `/ws`.
    Local,
}

impl FanoutTarget {
    /// Checks that the target can produce a publisher.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidMetadata`] for malformed Redis URLs.
    pub fn validate(&self) -> Result<(), RelayError> {
        match self {
            Self::Redis { url } => ::redis::Client::open(url.as_str())
                .map(|_| ())
                .map_err(|e| RelayError::InvalidMetadata(format!("fanout url: {e}"))),
            Self::Local => Ok(()),
        }
    }
}

/// Sends named events to a topic.
#[async_trait]
pub trait FanoutPublisher: Send + Sync + fmt::Debug {
    /// Publishes `data` as `event` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Publish`] if the backend rejects the message.
    async fn publish(&self, topic: &str, event: &str, data: &serde_json::Value) -> Result<(), RelayError>;

    /// Releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Publish`] if shutdown fails.
    async fn close(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Builds publishers for the fan-out pool.
#[derive(Debug, Clone)]
pub struct FanoutFactory {
    bus: LocalBus,
}

impl FanoutFactory {
    /// Creates a factory whose local targets publish on `bus`.
    #[must_use]
    pub const fn new(bus: LocalBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PoolFactory<FanoutTarget, Arc<dyn FanoutPublisher>> for FanoutFactory {
    fn create(&self, config: &FanoutTarget) -> Result<Arc<dyn FanoutPublisher>, RelayError> {
        let publisher: Arc<dyn FanoutPublisher> = match config {
            FanoutTarget::Redis { url } => Arc::new(RedisPublisher::new(url)?),
            FanoutTarget::Local => Arc::new(self.bus.clone()),
        };
        Ok(publisher)
    }

    async fn release(
        &self,
        _config: FanoutTarget,
        handle: Arc<dyn FanoutPublisher>,
    ) -> Result<(), RelayError> {
        handle.close().await
    }
}
