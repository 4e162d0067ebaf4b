//! Key-value storage for channels and presentations.
//!
//! Provides the [`KeyValueStore`] trait with two implementations:
//! [`MemoryStore`] for single-process deployments and tests, and
//! [`RedisStore`] for shared state across relay instances. The typed
//! repositories on top serialize records as JSON under prefixed keys.

pub mod memory;
pub mod redis;
pub mod repository;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::RelayError;

pub use memory::MemoryStore;
pub use repository::{ChannelRepository, PresentationRecord, PresentationRepository};
pub use self::redis::RedisStore;

/// Byte-valued store with per-key expiration.
#[async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Returns the value under `key`, or `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on backend failure.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError>;

    /// Stores `value` under `key`, expiring after `ttl_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on backend failure.
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), RelayError>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on backend failure.
    async fn delete(&self, key: &str) -> Result<(), RelayError>;

    /// Resets the expiration of `key`. Returns `false` if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Store`] on backend failure.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, RelayError>;

    /// Drops every expired key the backend still holds and returns how
    /// many were dropped. Backends that expire keys themselves keep the
    /// default no-op.
    async fn purge_expired(&self) -> usize {
        0
    }
}

/// Spawns a task that purges expired keys every `interval` until `cancel`
/// fires.
pub fn spawn_purger(
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = store.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!(purged, "expired store keys purged");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn purger_reclaims_keys_nobody_reads() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..1000 {
            assert!(store.set(&format!("presentation:{i}"), vec![1], 300).await.is_ok());
        }
        let cancel = CancellationToken::new();
        let task = spawn_purger(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Duration::from_secs(60),
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(250)).await;
        assert_eq!(store.len(), 1000);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(store.set("presentation:late", vec![1], 300).await.is_ok());
        assert_eq!(store.len(), 1);

        cancel.cancel();
        assert!(task.await.is_ok());
    }
}
