//! In-process [`KeyValueStore`].
//!
//! Reads drop the expired key they hit; everything else is reclaimed by
//! [`KeyValueStore::purge_expired`], which the relay runs periodically
//! through [`spawn_purger`](super::spawn_purger).

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::KeyValueStore;
use crate::error::RelayError;

#[derive(Debug)]
struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
}

/// `DashMap`-backed store. Expired keys are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, including expired ones not yet dropped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

fn deadline(ttl_secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(ttl_secs)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RelayError> {
        let now = Instant::now();
        if let Some(slot) = self.slots.get(key)
            && slot.expires_at > now
        {
            return Ok(Some(slot.value.clone()));
        }
        self.slots.remove_if(key, |_, slot| slot.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), RelayError> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: deadline(ttl_secs),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RelayError> {
        self.slots.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, RelayError> {
        let now = Instant::now();
        match self.slots.get_mut(key) {
            Some(mut slot) if slot.expires_at > now => {
                slot.expires_at = deadline(ttl_secs);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| slot.expires_at > now);
        before.saturating_sub(self.slots.len())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_keys() {
        let store = MemoryStore::new();
        assert!(store.set("short", b"v".to_vec(), 10).await.is_ok());
        assert!(store.set("long", b"v".to_vec(), 100).await.is_ok());
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len(), 1);
        assert!(matches!(store.get("long").await, Ok(Some(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_ttl() {
        let store = MemoryStore::new();
        assert!(store.set("k", b"v".to_vec(), 10).await.is_ok());
        let Ok(value) = store.get("k").await else {
            panic!("get failed");
        };
        assert_eq!(value.as_deref(), Some(b"v".as_slice()));

        tokio::time::advance(Duration::from_secs(11)).await;
        let Ok(value) = store.get("k").await else {
            panic!("get failed");
        };
        assert!(value.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_lifetime() {
        let store = MemoryStore::new();
        assert!(store.set("k", b"v".to_vec(), 10).await.is_ok());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(matches!(store.expire("k", 10).await, Ok(true)));
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(matches!(store.get("k").await, Ok(Some(_))));
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_false() {
        let store = MemoryStore::new();
        assert!(matches!(store.expire("missing", 10).await, Ok(false)));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryStore::new();
        assert!(store.set("k", b"v".to_vec(), 10).await.is_ok());
        assert!(store.delete("k").await.is_ok());
        assert!(matches!(store.get("k").await, Ok(None)));
    }
}
