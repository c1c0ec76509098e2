//! Cache capability traits.
//!
//! Both capabilities are optional. A `Model` without a [`CacheStore`] never
//! caches reads, and one without a [`CacheClear`] never invalidates.

use async_trait::async_trait;
use quarry_core::CacheError;
use serde_json::Value;
use std::time::Duration;

/// Key-value cache for query results.
///
/// Values are JSON so that any backend (in-process map, Redis, memcached)
/// can hold them without knowing the document types.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Cached value for `key`, `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Store `value` under `key` for `ttl`.
    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError>;
}

/// Pattern-based cache eviction.
#[async_trait]
pub trait CacheClear: Send + Sync {
    /// Remove every entry whose key matches `pattern`.
    ///
    /// A trailing `*` matches any suffix. Returns the number of entries
    /// removed.
    async fn clear(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses, expired entries included.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of entries removed by `clear`.
    pub cleared: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
