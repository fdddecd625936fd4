//! In-memory cache manager with per-entry expiry
//!
//! Provides a `CacheManager` that keeps values in a concurrent map with
//! absolute expiry instants. Expired entries are treated as absent and
//! evicted lazily when they are read; nothing sweeps the map in the background.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Upper bound applied when `now + ttl` would overflow
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Wrapper struct for a cached value
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    /// The cached value
    value: V,
    /// When the value was cached
    cached_at: DateTime<Utc>,
    /// When the cache entry expires
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Result of reading from cache, including metadata about the entry
#[derive(Debug, Clone)]
pub struct CachedData<V> {
    /// The cached value
    pub data: V,
    /// When the value was originally cached
    pub cached_at: DateTime<Utc>,
    /// Time left before the entry expires
    pub remaining: Duration,
}

/// Process-wide cache shared across request handlers
///
/// Cloning a `CacheManager` yields another handle to the same map. Every
/// write fully replaces the previous entry for its key, so readers never
/// observe a partially updated value.
#[derive(Debug)]
pub struct CacheManager<V> {
    entries: Arc<DashMap<String, CacheEntry<V>>>,
}

impl<V> Clone for CacheManager<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<V> Default for CacheManager<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> CacheManager<V> {
    /// Creates an empty cache
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Stores `value` under `key`, expiring `ttl` from now
    ///
    /// Any previous entry for the key is overwritten unconditionally.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let now = Instant::now();
        let entry = CacheEntry {
            value,
            cached_at: Utc::now(),
            expires_at: now
                .checked_add(ttl)
                .unwrap_or_else(|| now + MAX_TTL),
        };
        self.entries.insert(key.into(), entry);
    }

    /// Number of entries currently held, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> CacheManager<V> {
    /// Reads a fresh value from the cache
    ///
    /// Returns `None` if the key is missing or its entry has expired. An
    /// expired entry is removed as a side effect.
    pub fn get(&self, key: &str) -> Option<V> {
        self.read(key).map(|cached| cached.data)
    }

    /// Reads a fresh value together with its cache metadata
    pub fn read(&self, key: &str) -> Option<CachedData<V>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired_at(now) {
                return Some(CachedData {
                    data: entry.value.clone(),
                    cached_at: entry.cached_at,
                    remaining: entry.expires_at.saturating_duration_since(now),
                });
            }
        }

        // The read guard is released above; a concurrent `set` may have
        // refreshed the entry since, so only drop it if it is still stale.
        self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        None
    }
}
