//! Cache invalidation after writes.
//!
//! Every successful mutation of a model clears the cache entries that could
//! now be stale. Clearing runs in the background on the tokio runtime and its
//! failures are logged, never returned.

use quarry_core::{CacheKeyBuilder, DocumentId};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::cache::CacheClear;

/// Issues cache clears for one model.
#[derive(Clone)]
pub struct InvalidationDispatcher {
    model: String,
    clear: Option<Arc<dyn CacheClear>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl std::fmt::Debug for InvalidationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationDispatcher")
            .field("model", &self.model)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl InvalidationDispatcher {
    /// A dispatcher for `model`. Without a clear capability every call is a
    /// no-op.
    pub fn new(model: impl Into<String>, clear: Option<Arc<dyn CacheClear>>) -> Self {
        Self {
            model: model.into(),
            clear,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_enabled(&self) -> bool {
        self.clear.is_some()
    }

    /// Patterns a mutation of `id` clears.
    pub fn patterns(&self, id: Option<&DocumentId>) -> Vec<String> {
        CacheKeyBuilder::new(&self.model).invalidation_patterns(id)
    }

    /// Invalidate after a successful mutation.
    ///
    /// Call this only once the write has returned successfully. Inside a tokio
    /// runtime the clears are spawned and this returns immediately; elsewhere
    /// they run inline.
    pub async fn on_mutation(&self, id: Option<&DocumentId>) {
        let Some(clear) = self.clear.as_ref().map(Arc::clone) else {
            return;
        };
        let patterns = self.patterns(id);
        let model = self.model.clone();
        let task = async move {
            for pattern in patterns {
                match clear.clear(&pattern).await {
                    Ok(removed) => {
                        tracing::debug!(
                            model = %model,
                            pattern = %pattern,
                            removed,
                            "Cache entries cleared"
                        );
                    }
                    Err(e) => {
                        tracing::debug!(
                            model = %model,
                            pattern = %pattern,
                            error = %e,
                            "Cache clear failed"
                        );
                    }
                }
            }
        };

        match Handle::try_current() {
            Ok(handle) => {
                let join = handle.spawn(task);
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                pending.retain(|job| !job.is_finished());
                pending.push(join);
            }
            Err(_) => task.await,
        }
    }

    /// Wait for every dispatched invalidation to finish.
    ///
    /// Callers never need this for correctness; tests and shutdown paths use
    /// it to observe the cache after a write.
    pub async fn settle(&self) {
        loop {
            let jobs: Vec<JoinHandle<()>> = {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *pending)
            };
            if jobs.is_empty() {
                return;
            }
            for job in jobs {
                if let Err(e) = job.await {
                    tracing::debug!(
                        model = %self.model,
                        error = %e,
                        "Invalidation task did not complete"
                    );
                }
            }
        }
    }

    /// Number of dispatched invalidations not yet finished.
    pub fn pending(&self) -> usize {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.iter().filter(|job| !job.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, InMemoryCache};
    use serde_json::json;
    use std::future::Future;
    use std::time::Duration;

    fn dispatcher(cache: &Arc<InMemoryCache>) -> InvalidationDispatcher {
        InvalidationDispatcher::new("Item", Some(cache.clone() as Arc<dyn CacheClear>))
    }

    #[tokio::test]
    async fn test_clears_expected_patterns_for_id() {
        let cache = Arc::new(InMemoryCache::new());
        let dispatcher = dispatcher(&cache);

        dispatcher.on_mutation(Some(&DocumentId::from("42"))).await;
        dispatcher.settle().await;

        assert_eq!(
            cache.cleared_patterns().await,
            vec!["Item:count*", "Item:list*", "Item:get:42#*", "Item:get#*"]
        );
    }

    #[tokio::test]
    async fn test_without_id_clears_all_gets() {
        let cache = Arc::new(InMemoryCache::new());
        let dispatcher = dispatcher(&cache);

        dispatcher.on_mutation(None).await;
        dispatcher.settle().await;

        assert_eq!(
            cache.cleared_patterns().await,
            vec!["Item:count*", "Item:list*", "Item:get*"]
        );
    }

    #[tokio::test]
    async fn test_entries_removed_and_others_kept() {
        let cache = Arc::new(InMemoryCache::new());
        let ttl = Duration::from_secs(60);
        for key in [
            "Item:list#a",
            "Item:count#a",
            "Item:get:42#a",
            "Item:get#a",
            "Item:get:7#a",
            "Author:list#a",
        ] {
            cache.put(key, json!(1), ttl).await.unwrap();
        }

        let dispatcher = dispatcher(&cache);
        dispatcher.on_mutation(Some(&DocumentId::from("42"))).await;
        dispatcher.settle().await;

        assert_eq!(
            cache.keys().await,
            vec!["Author:list#a".to_string(), "Item:get:7#a".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clear_failures_are_swallowed() {
        let cache = Arc::new(InMemoryCache::new());
        cache.set_fail_clears(true);
        let dispatcher = dispatcher(&cache);

        dispatcher.on_mutation(Some(&DocumentId::from("1"))).await;
        dispatcher.settle().await;

        // Every pattern was still attempted.
        assert_eq!(cache.cleared_patterns().await.len(), 4);
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_disabled_without_clear_capability() {
        let dispatcher = InvalidationDispatcher::new("Item", None);
        assert!(!dispatcher.is_enabled());
        dispatcher.on_mutation(None).await;
        dispatcher.settle().await;
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn test_runs_inline_without_runtime() {
        let cache = Arc::new(InMemoryCache::new());
        let dispatcher = dispatcher(&cache);

        struct NoopWake;
        impl std::task::Wake for NoopWake {
            fn wake(self: Arc<Self>) {}
        }

        let waker = std::task::Waker::from(Arc::new(NoopWake));
        let mut cx = std::task::Context::from_waker(&waker);
        let mut fut = std::pin::pin!(dispatcher.on_mutation(None));
        // The in-memory cache never suspends on an uncontended lock.
        assert!(fut.as_mut().poll(&mut cx).is_ready());
        assert_eq!(dispatcher.pending(), 0);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let patterns = runtime.block_on(cache.cleared_patterns());
        assert_eq!(patterns.len(), 3);
    }
}
