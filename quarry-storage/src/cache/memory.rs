//! In-process cache used by tests and small deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quarry_core::{matches_pattern, CacheError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use super::traits::{CacheClear, CacheStats, CacheStore};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// In-memory [`CacheStore`] and [`CacheClear`] with TTL expiry.
///
/// Every clear pattern is recorded so tests can assert exactly what a write
/// invalidated. Clear and read failures can be injected.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: tokio::sync::RwLock<HashMap<String, CacheEntry>>,
    cleared_patterns: tokio::sync::RwLock<Vec<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    cleared: AtomicU64,
    fail_clears: AtomicBool,
    fail_reads: AtomicBool,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `clear` fail (or succeed again).
    pub fn set_fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent `get` fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Patterns passed to `clear`, in call order, failed calls included.
    pub async fn cleared_patterns(&self) -> Vec<String> {
        self.cleared_patterns.read().await.clone()
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    pub async fn len(&self) -> usize {
        self.keys().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            entry_count: self.len().await as u64,
            cleared: self.cleared.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::ReadFailed {
                key: key.to_string(),
                reason: "injected read failure".to_string(),
            });
        }

        let now = Utc::now();
        let hit = {
            let entries = self.entries.read().await;
            entries
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.value.clone())
        };

        match hit {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::SeqCst);
                Ok(Some(value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::SeqCst);
                let mut entries = self.entries.write().await;
                if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
                    entries.remove(key);
                }
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), CacheError> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| CacheError::WriteFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }
}

#[async_trait]
impl CacheClear for InMemoryCache {
    async fn clear(&self, pattern: &str) -> Result<u64, CacheError> {
        self.cleared_patterns.write().await.push(pattern.to_string());

        if self.fail_clears.load(Ordering::SeqCst) {
            return Err(CacheError::ClearFailed {
                pattern: pattern.to_string(),
                reason: "injected clear failure".to_string(),
            });
        }

        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !matches_pattern(pattern, key));
        let removed = (before - entries.len()) as u64;
        self.cleared.fetch_add(removed, Ordering::SeqCst);
        Ok(removed)
    }
}
