//! Bounded in-memory cache keyed by city or query string.
//!
//! One instance is owned by each component that memoizes results (the
//! coordinate resolver, the historical data provider). Values are cloned out,
//! so store `Arc`s for anything large. Concurrent population of the same key is
//! coalesced: a reader never sees a partially written entry.

use moka::future::Cache;
use std::fmt::Debug;
use std::future::Future;
use tracing::debug;

pub struct BoundedCache<V> {
    name: &'static str,
    store: Cache<String, V>,
}

impl<V> Debug for BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("entries", &self.store.entry_count())
            .finish()
    }
}

impl<V> BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` entries.
    #[must_use]
    pub fn new(name: &'static str, capacity: u64) -> Self {
        Self {
            name,
            store: Cache::builder().max_capacity(capacity.max(1)).build(),
        }
    }

    /// Returns the cached value, if any.
    pub async fn get(&self, key: &str) -> Option<V> {
        let hit = self.store.get(key).await;
        debug!(cache = self.name, key, hit = hit.is_some(), "cache lookup");
        hit
    }

    /// Returns the cached value or runs `init` to produce it. Callers racing on
    /// the same key wait for a single initialisation.
    pub async fn get_or_insert_with<F>(&self, key: &str, init: F) -> V
    where
        F: Future<Output = V>,
    {
        self.store.get_with(key.to_string(), init).await
    }

    /// Manually removes a key from the cache.
    pub async fn remove(&self, key: &str) {
        debug!(cache = self.name, key, "cache invalidation");
        self.store.invalidate(key).await;
    }

    /// Number of live entries after pending evictions are applied.
    pub async fn len(&self) -> u64 {
        self.store.run_pending_tasks().await;
        self.store.entry_count()
    }
}
