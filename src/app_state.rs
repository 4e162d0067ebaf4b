//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RelayConfig;
use crate::domain::ResourcePool;
use crate::error::RelayError;
use crate::fanout::{FanoutFactory, FanoutPool, LocalBus};
use crate::scheme::SchemeRegistry;
use crate::service::RelayService;
use crate::signature::VerifyOptions;
use crate::store::{
    self, ChannelRepository, KeyValueStore, MemoryStore, PresentationRepository, RedisStore,
};
use crate::telemetry::{InfluxWriterFactory, TelemetryPool};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Relay service for all business logic.
    pub relay: Arc<RelayService>,
    /// Local fan-out bus feeding WebSocket subscribers.
    pub local_bus: LocalBus,
    /// Key-value store behind channels and presentations.
    pub store: Arc<dyn KeyValueStore>,
    /// Runtime configuration.
    pub config: Arc<RelayConfig>,
    /// Cancelled on graceful shutdown; cuts deferred responses short.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Builds the state, connecting to Redis when `REDIS_URL` is set and
    /// falling back to an in-memory store otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] if Redis is configured but unreachable.
    pub async fn from_config(config: RelayConfig) -> Result<Self, RelayError> {
        let store: Arc<dyn KeyValueStore> = match &config.redis_url {
            Some(url) => {
                tracing::info!(prefix = %config.redis_key_prefix, "using redis store");
                Arc::new(RedisStore::connect(url, config.redis_key_prefix.clone()).await?)
            }
            None => {
                tracing::warn!("REDIS_URL not set, channels are kept in memory");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_store(config, store))
    }

    /// Builds the state on top of an existing store.
    #[must_use]
    pub fn with_store(config: RelayConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let local_bus = LocalBus::new(config.local_bus_capacity);

        let telemetry: Arc<TelemetryPool> = Arc::new(ResourcePool::with_max_age(
            "telemetry",
            Arc::new(InfluxWriterFactory::new(
                config.telemetry_flush_interval,
                config.telemetry_http_timeout,
            )),
            config.pool_max_age,
        ));
        let fanout: Arc<FanoutPool> = Arc::new(ResourcePool::with_max_age(
            "fanout",
            Arc::new(FanoutFactory::new(local_bus.clone())),
            config.pool_max_age,
        ));

        let relay = RelayService::new(
            ChannelRepository::new(Arc::clone(&store), config.channel_ttl_secs),
            PresentationRepository::new(Arc::clone(&store), config.presentation_ttl_secs),
            SchemeRegistry::builtin(),
            telemetry,
            fanout,
            VerifyOptions::default().with_clock_skew(std::time::Duration::from_secs(
                config.signature_clock_skew_secs,
            )),
        );

        Self {
            relay: Arc::new(relay),
            local_bus,
            store,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    /// Starts the background maintenance tasks: the idle sweepers of both
    /// client pools and the store purger. Sweepers drain their pool once
    /// `cancel` fires.
    #[must_use]
    pub fn spawn_sweepers(&self, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let interval = self.config.pool_sweep_interval;
        vec![
            Arc::clone(self.relay.telemetry_pool()).spawn_sweeper(interval, cancel.clone()),
            Arc::clone(self.relay.fanout_pool()).spawn_sweeper(interval, cancel.clone()),
            store::spawn_purger(
                Arc::clone(&self.store),
                self.config.store_purge_interval,
                cancel.clone(),
            ),
        ]
    }
}
