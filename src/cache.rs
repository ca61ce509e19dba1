//! Time-bounded memoization.
//!
//! A thread-safe TTL cache backed by `DashMap`. Entries expire a fixed
//! duration after insertion and are treated as absent once expired; they are
//! removed lazily on lookup or by [`TtlCache::evict_expired`].
//!
//! Capacity is unbounded. Shard locks are held only for the map access itself,
//! never while a value is being computed.

use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A concurrent cache whose entries live for `ttl` after insertion.
#[derive(Debug, Clone)]
pub struct TtlCache<K: Eq + Hash, V> {
    inner: Arc<DashMap<K, Entry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty cache.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            clock,
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get a cached value if present and not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        if let Some(entry) = self.inner.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
            // Release the read guard before removing
            drop(entry);
            self.inner.remove_if(key, |_, e| e.expires_at <= now);
        }
        None
    }

    /// Insert or replace a value, restarting its TTL.
    pub fn insert(&self, key: K, value: V) {
        let expires_at = self.clock.now() + self.ttl;
        self.inner.insert(key, Entry { value, expires_at });
    }

    /// Return the cached value for `key`, or run `compute` and cache its output.
    ///
    /// Concurrent misses on the same key may both compute; the last insert wins.
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        if let Some(hit) = self.get(&key) {
            return hit;
        }

        let value = compute().await;
        self.insert(key, value.clone());
        value
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.inner.len();
        self.inner.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.inner.len())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
