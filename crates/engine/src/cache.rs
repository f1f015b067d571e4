//! TTL-keyed store for idempotent read results.
//!
//! Entries are checked lazily: an expired entry is dropped the first time a
//! read finds it and is never swept in the background. Expiry uses
//! [`tokio::time::Instant`], so paused test clocks drive it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use protocol::{CacheConfig, Response};
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Response,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Hit/miss counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a live entry.
    pub hits: u64,
    /// Reads that found nothing, or only an expired entry.
    pub misses: u64,
    /// Entries currently held, including expired ones not yet read.
    pub entries: usize,
}

/// Shared response cache. Last writer wins per key.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Creates an empty cache using `config.ttl` as the default lifetime.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl: config.ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the lifetime applied by [`ResponseCache::insert`].
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the live value for `key`, dropping it if it has expired.
    pub fn get(&self, key: &str) -> Option<Response> {
        let mut entries = self.lock();
        let now = Instant::now();
        let live = entries
            .get(key)
            .map(|entry| (!entry.is_expired(now)).then(|| entry.value.clone()));
        match live {
            Some(Some(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key, "cache hit");
                Some(value)
            }
            Some(None) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key, "cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` under the default TTL.
    pub fn insert(&self, key: impl Into<String>, value: Response) {
        self.insert_with_ttl(key, value, self.default_ttl);
    }

    /// Stores `value` for `ttl`, replacing any previous entry.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: Response, ttl: Duration) {
        let key = key.into();
        trace!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache insert");
        self.lock().insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes the entry for `key`, returning `true` if one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no entries are held.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Returns hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    // A panic while holding the lock cannot leave a half-written entry, so a
    // poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache_with_ttl(secs: u64) -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            ttl: Duration::from_secs(secs),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn live_entry_is_returned() {
        let cache = cache_with_ttl(300);
        cache.insert("Viewer:{}", Response::from_data(json!({"viewer": {"id": "u1"}})));

        tokio::time::advance(Duration::from_secs(100)).await;

        let hit = cache.get("Viewer:{}").unwrap();
        assert_eq!(hit.data, Some(json!({"viewer": {"id": "u1"}})));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_never_returned_and_is_dropped_on_read() {
        let cache = cache_with_ttl(300);
        cache.insert("Viewer:{}", Response::from_data(json!(1)));

        tokio::time::advance(Duration::from_secs(300)).await;

        // Still held until someone reads it.
        assert_eq!(cache.len(), 1);
        assert!(cache.get("Viewer:{}").is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_ttl_overrides_default() {
        let cache = cache_with_ttl(300);
        cache.insert_with_ttl("k", Response::from_data(json!(1)), Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn last_writer_wins() {
        let cache = ResponseCache::default();
        cache.insert("k", Response::from_data(json!(1)));
        cache.insert("k", Response::from_data(json!(2)));
        assert_eq!(cache.get("k").unwrap().data, Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = ResponseCache::default();
        cache.insert("a", Response::default());
        cache.insert("b", Response::default());

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
