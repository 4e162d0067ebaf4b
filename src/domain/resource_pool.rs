//! Keyed, idle-evicted pool of expensive client handles.
//!
//! [`ResourcePool`] caches one handle per distinct configuration value,
//! keyed by [`PoolKey`]. Handles are constructed lazily on first
//! [`ResourcePool::acquire`], reused by every later request carrying an
//! equal configuration, and released by [`ResourcePool::sweep`] once they
//! have been idle longer than the pool's maximum age.
//!
//! # Concurrency
//!
//! Entries live in a [`DashMap`]. A lookup refreshes the entry's activity
//! timestamp while holding the entry's shard lock, and a sweep removes an
//! entry with a conditional `remove_if` on the same shard. A handle is
//! therefore either refreshed (and kept) or removed (and released), never
//! both, so `acquire` cannot return a handle whose release has begun.
//!
//! Construction is not serialized: two cold `acquire` calls for the same
//! key may both build a handle. The first insert wins; the other handle is
//! dropped without ever being published to the pool.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::PoolKey;
use crate::error::RelayError;

/// Default idle age after which a handle is evicted.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30);

/// Builds and tears down the handles stored in a [`ResourcePool`].
#[async_trait]
pub trait PoolFactory<C, H>: Send + Sync + fmt::Debug {
    /// Constructs a new handle for `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] if the configuration cannot produce a
    /// usable handle.
    fn create(&self, config: &C) -> Result<H, RelayError>;

    /// Releases a handle that has been evicted from the pool.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] if shutdown of the underlying client fails.
    /// The pool logs the error and moves on.
    async fn release(&self, config: C, handle: H) -> Result<(), RelayError>;
}

/// A cached handle together with the configuration that built it.
#[derive(Debug)]
pub struct PooledEntry<C, H> {
    /// Configuration the handle was created from.
    pub config: C,
    /// The live handle.
    pub handle: H,
    /// Last time the handle was handed out.
    pub last_activity_at: Instant,
}

/// Keyed cache of client handles with idle eviction.
pub struct ResourcePool<C, H> {
    label: &'static str,
    max_age: Duration,
    factory: Arc<dyn PoolFactory<C, H>>,
    entries: DashMap<PoolKey, PooledEntry<C, H>>,
}

impl<C, H> fmt::Debug for ResourcePool<C, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("label", &self.label)
            .field("max_age", &self.max_age)
            .field("factory", &self.factory)
            .field("len", &self.entries.len())
            .finish()
    }
}

impl<C, H> ResourcePool<C, H>
where
    C: Serialize + Clone + Send + Sync + 'static,
    H: Clone + Send + Sync + 'static,
{
    /// Creates an empty pool using [`DEFAULT_MAX_AGE`].
    #[must_use]
    pub fn new(label: &'static str, factory: Arc<dyn PoolFactory<C, H>>) -> Self {
        Self::with_max_age(label, factory, DEFAULT_MAX_AGE)
    }

    /// Creates an empty pool with a custom idle age.
    #[must_use]
    pub fn with_max_age(
        label: &'static str,
        factory: Arc<dyn PoolFactory<C, H>>,
        max_age: Duration,
    ) -> Self {
        Self {
            label,
            max_age,
            factory,
            entries: DashMap::new(),
        }
    }

    /// Returns the handle for `config`, constructing it on a cache miss.
    ///
    /// Always refreshes the entry's activity timestamp.
    ///
    /// # Errors
    ///
    /// Returns a [`RelayError`] if the configuration cannot be hashed or
    /// the factory fails to build a handle.
    pub fn acquire(&self, config: &C) -> Result<H, RelayError> {
        let key = PoolKey::derive(config)?;

        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.last_activity_at = Instant::now();
            tracing::debug!(pool = self.label, %key, "pool hit");
            return Ok(entry.handle.clone());
        }

        let handle = self.factory.create(config)?;

        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                // Lost a cold-cache race; keep the published handle.
                let entry = occupied.get_mut();
                entry.last_activity_at = Instant::now();
                tracing::debug!(pool = self.label, %key, "pool race lost, dropping duplicate");
                Ok(entry.handle.clone())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PooledEntry {
                    config: config.clone(),
                    handle: handle.clone(),
                    last_activity_at: Instant::now(),
                });
                tracing::debug!(pool = self.label, %key, "pool miss, handle created");
                Ok(handle)
            }
        }
    }

    /// Evicts and releases every entry idle longer than the maximum age.
    ///
    /// Returns the number of evicted entries. Release failures are logged,
    /// never returned.
    pub async fn sweep(&self) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(self.max_age) else {
            return 0;
        };

        let stale: Vec<PoolKey> = self
            .entries
            .iter()
            .filter(|entry| entry.last_activity_at < cutoff)
            .map(|entry| *entry.key())
            .collect();

        let mut evicted = 0;
        for key in stale {
            // Re-check under the shard lock: a concurrent acquire may have
            // refreshed the entry since the scan.
            let removed = self
                .entries
                .remove_if(&key, |_, entry| entry.last_activity_at < cutoff);
            if let Some((key, entry)) = removed {
                evicted += 1;
                self.release(key, entry).await;
            }
        }

        if evicted > 0 {
            tracing::debug!(pool = self.label, evicted, "pool sweep");
        }
        evicted
    }

    /// Removes and releases every entry. Used on shutdown.
    pub async fn release_all(&self) -> usize {
        let keys: Vec<PoolKey> = self.entries.iter().map(|entry| *entry.key()).collect();
        let mut released = 0;
        for key in keys {
            if let Some((key, entry)) = self.entries.remove(&key) {
                released += 1;
                self.release(key, entry).await;
            }
        }
        tracing::info!(pool = self.label, released, "pool drained");
        released
    }

    /// Spawns a background task that sweeps every `interval` until `cancel`
    /// fires, then drains the pool.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            self.release_all().await;
        })
    }

    /// Returns the number of cached handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no handle is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a handle is cached for `config`.
    #[must_use]
    pub fn contains(&self, config: &C) -> bool {
        PoolKey::derive(config).is_ok_and(|key| self.entries.contains_key(&key))
    }

    /// Returns the configured idle age.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        self.max_age
    }

    async fn release(&self, key: PoolKey, entry: PooledEntry<C, H>) {
        if let Err(err) = self.factory.release(entry.config, entry.handle).await {
            tracing::warn!(pool = self.label, %key, error = %err, "failed to release pooled handle");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde::Serialize;

    use super::*;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Target {
        url: String,
    }

    fn target(url: &str) -> Target {
        Target {
            url: url.to_string(),
        }
    }

    /// A handle that records whether its release has begun.
    #[derive(Debug)]
    struct Client {
        serial: usize,
        released: AtomicBool,
    }

    #[derive(Debug, Default)]
    struct CountingFactory {
        created: AtomicUsize,
        released: Mutex<Vec<usize>>,
        fail_release: bool,
    }

    #[async_trait]
    impl PoolFactory<Target, Arc<Client>> for CountingFactory {
        fn create(&self, config: &Target) -> Result<Arc<Client>, RelayError> {
            if config.url.is_empty() {
                return Err(RelayError::InvalidRequest("empty url".to_string()));
            }
            let serial = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Client {
                serial,
                released: AtomicBool::new(false),
            }))
        }

        async fn release(&self, _config: Target, handle: Arc<Client>) -> Result<(), RelayError> {
            handle.released.store(true, Ordering::SeqCst);
            if let Ok(mut released) = self.released.lock() {
                released.push(handle.serial);
            }
            if self.fail_release {
                return Err(RelayError::Internal("close failed".to_string()));
            }
            Ok(())
        }
    }

    fn make_pool(factory: &Arc<CountingFactory>) -> ResourcePool<Target, Arc<Client>> {
        let factory: Arc<dyn PoolFactory<Target, Arc<Client>>> = Arc::clone(factory) as _;
        ResourcePool::new("test", factory)
    }

    fn acquire(pool: &ResourcePool<Target, Arc<Client>>, t: &Target) -> Arc<Client> {
        let Ok(handle) = pool.acquire(t) else {
            panic!("acquire should succeed");
        };
        handle
    }

    fn released(factory: &CountingFactory) -> Vec<usize> {
        factory
            .released
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn equal_configs_reuse_the_same_handle() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        let a = acquire(&pool, &target("http://influx:8086"));
        let b = acquire(&pool, &target("http://influx:8086"));

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn distinct_configs_get_distinct_handles() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        let a = acquire(&pool, &target("redis://a"));
        let b = acquire(&pool, &target("redis://b"));

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn factory_error_is_propagated_and_nothing_cached() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        assert!(pool.acquire(&target("")).is_err());
        assert!(pool.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_evicts_idle_entries_and_releases_once() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        let stale = acquire(&pool, &target("redis://stale"));
        tokio::time::advance(Duration::from_secs(20)).await;
        let _fresh = acquire(&pool, &target("redis://fresh"));
        tokio::time::advance(Duration::from_secs(15)).await;

        assert_eq!(pool.sweep().await, 1);
        assert!(!pool.contains(&target("redis://stale")));
        assert!(pool.contains(&target("redis://fresh")));
        assert!(stale.released.load(Ordering::SeqCst));

        // A second sweep must not release the same handle again.
        assert_eq!(pool.sweep().await, 0);
        assert_eq!(released(&factory), vec![stale.serial]);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_refreshes_activity() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        let first = acquire(&pool, &target("redis://a"));
        tokio::time::advance(Duration::from_secs(25)).await;
        let again = acquire(&pool, &target("redis://a"));
        tokio::time::advance(Duration::from_secs(25)).await;

        assert_eq!(pool.sweep().await, 0);
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test(start_paused = true)]
    async fn evicted_config_is_rebuilt_on_next_acquire() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        let old = acquire(&pool, &target("redis://a"));
        tokio::time::advance(Duration::from_secs(31)).await;
        pool.sweep().await;

        let new = acquire(&pool, &target("redis://a"));
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(!new.released.load(Ordering::SeqCst));
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn release_failure_is_absorbed() {
        let factory = Arc::new(CountingFactory {
            fail_release: true,
            ..CountingFactory::default()
        });
        let pool = make_pool(&factory);

        let _ = acquire(&pool, &target("redis://a"));
        tokio::time::advance(Duration::from_secs(31)).await;

        assert_eq!(pool.sweep().await, 1);
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn release_all_drains_the_pool() {
        let factory = Arc::new(CountingFactory::default());
        let pool = make_pool(&factory);

        let _ = acquire(&pool, &target("redis://a"));
        let _ = acquire(&pool, &target("redis://b"));

        assert_eq!(pool.release_all().await, 2);
        assert!(pool.is_empty());
        assert_eq!(released(&factory).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_never_observes_released_handle() {
        let factory = Arc::new(CountingFactory::default());
        let factory_dyn: Arc<dyn PoolFactory<Target, Arc<Client>>> = Arc::clone(&factory) as _;
        let pool = Arc::new(ResourcePool::with_max_age(
            "test",
            factory_dyn,
            Duration::from_millis(20),
        ));

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(async move {
                for i in 0..100 {
                    if worker % 2 == 0 {
                        let Ok(handle) = pool.acquire(&target("redis://shared")) else {
                            panic!("acquire failed");
                        };
                        assert!(
                            !handle.released.load(Ordering::SeqCst),
                            "acquire returned a released handle"
                        );
                        if i % 20 == 19 {
                            // Let the entry go idle so sweepers evict it.
                            tokio::time::sleep(Duration::from_millis(25)).await;
                        }
                    } else {
                        pool.sweep().await;
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            }));
        }
        for task in tasks {
            assert!(task.await.is_ok());
        }

        pool.release_all().await;
        let mut serials = released(&factory);
        let total = serials.len();
        serials.sort_unstable();
        serials.dedup();
        assert_eq!(serials.len(), total, "a handle was released twice");
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel_and_drains() {
        let factory = Arc::new(CountingFactory::default());
        let pool = Arc::new(make_pool(&factory));
        let cancel = CancellationToken::new();

        let _ = acquire(&pool, &target("redis://a"));
        let task = Arc::clone(&pool).spawn_sweeper(Duration::from_secs(5), cancel.clone());

        tokio::time::advance(Duration::from_secs(1)).await;
        cancel.cancel();
        assert!(task.await.is_ok());
        assert!(pool.is_empty());
        assert_eq!(released(&factory).len(), 1);
    }
}
