//! Key-addressed query cache.
//!
//! Entries carry a staleness window (stale entries remain servable but are
//! refetched on the next `fetch_with`) and a GC window (entries idle past it
//! are evicted by the background sweeper). In-flight fetches can be cancelled
//! per key so a late server response never overwrites an optimistic write.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::transport::TransportError;

use super::keys::QueryKey;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub gc_time_ms: u64,
    pub invalidated: bool,
    pub last_access: DateTime<Utc>,
    pub stale_time_ms: u64,
}

impl CacheEntry {
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        if self.invalidated {
            return true;
        }
        let age = now.signed_duration_since(self.fetched_at);
        age >= chrono::Duration::milliseconds(self.stale_time_ms as i64)
    }

    fn is_evictable(&self, now: DateTime<Utc>) -> bool {
        let idle = now.signed_duration_since(self.last_access);
        idle >= chrono::Duration::milliseconds(self.gc_time_ms as i64)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, CacheEntry>,
    // Fetch generation per key; bumped by cancel_queries so an in-flight
    // fetch started under an older generation discards its write.
    generations: HashMap<QueryKey, u64>,
}

#[derive(Clone)]
pub struct CacheStore {
    config: CacheConfig,
    inner: Arc<RwLock<Inner>>,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Read an entry, recording the access. Stale entries are still served.
    pub async fn get(&self, key: &QueryKey) -> Option<Value> {
        let mut inner = self.inner.write().await;
        let entry = inner.entries.get_mut(key)?;
        entry.last_access = Utc::now();
        Some(entry.data.clone())
    }

    /// Read an entry without recording the access; used for rollback
    /// snapshots and assertions.
    pub async fn snapshot(&self, key: &QueryKey) -> Option<Value> {
        let inner = self.inner.read().await;
        inner.entries.get(key).map(|e| e.data.clone())
    }

    pub async fn get_as<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, error = %e, "cached value failed to decode");
                None
            }
        }
    }

    /// Write an entry with a fresh timestamp and the store's default windows.
    pub async fn set(&self, key: &QueryKey, data: Value) {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        inner.entries.insert(
            key.clone(),
            CacheEntry {
                data,
                fetched_at: now,
                gc_time_ms: self.config.gc_time_ms,
                invalidated: false,
                last_access: now,
                stale_time_ms: self.config.stale_time_ms,
            },
        );
    }

    /// Mark one entry stale, forcing a refetch on next access.
    pub async fn invalidate(&self, key: &QueryKey) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.invalidated = true;
            debug!(key = %key, "cache entry invalidated");
        }
    }

    /// Mark every key nested under the family root stale.
    pub async fn invalidate_prefix(&self, family: &QueryKey) {
        let mut inner = self.inner.write().await;
        let mut count = 0usize;
        for (key, entry) in inner.entries.iter_mut() {
            if key.starts_with(family) {
                entry.invalidated = true;
                count += 1;
            }
        }
        if count > 0 {
            debug!(family = %family, count, "cache family invalidated");
        }
    }

    pub async fn remove(&self, key: &QueryKey) -> Option<Value> {
        let mut inner = self.inner.write().await;
        inner.entries.remove(key).map(|e| e.data)
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.generations.clear();
    }

    /// Cancel in-flight fetches for a key. Fetches already running will still
    /// resolve for their caller, but their result is not written back.
    pub async fn cancel_queries(&self, key: &QueryKey) {
        let mut inner = self.inner.write().await;
        *inner.generations.entry(key.clone()).or_insert(0) += 1;
    }

    pub async fn is_stale(&self, key: &QueryKey) -> bool {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(key)
            .map_or(true, |e| e.is_stale(Utc::now()))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Serve the cached value while fresh; otherwise run the fetcher and
    /// store its result, unless a cancellation intervened mid-flight.
    pub async fn fetch_with<F, Fut>(
        &self,
        key: &QueryKey,
        fetcher: F,
    ) -> Result<Value, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, TransportError>>,
    {
        let generation = {
            let mut inner = self.inner.write().await;
            if let Some(entry) = inner.entries.get_mut(key) {
                if !entry.is_stale(Utc::now()) {
                    entry.last_access = Utc::now();
                    return Ok(entry.data.clone());
                }
            }
            inner.generations.get(key).copied().unwrap_or(0)
        };

        let data = fetcher().await?;

        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let current = inner.generations.get(key).copied().unwrap_or(0);
        if current == generation {
            inner.entries.insert(
                key.clone(),
                CacheEntry {
                    data: data.clone(),
                    fetched_at: now,
                    gc_time_ms: self.config.gc_time_ms,
                    invalidated: false,
                    last_access: now,
                    stale_time_ms: self.config.stale_time_ms,
                },
            );
        } else {
            debug!(key = %key, "fetch cancelled mid-flight; result not cached");
        }
        Ok(data)
    }

    /// Evict entries idle past their GC window. Returns the eviction count.
    pub async fn gc_sweep(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_evictable(now));
        before - inner.entries.len()
    }
}

/// Start the background GC sweeper task.
pub fn start_gc_sweeper(cache: CacheStore) -> JoinHandle<()> {
    let interval = std::time::Duration::from_secs(cache.config.gc_interval_seconds);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            let evicted = cache.gc_sweep(Utc::now()).await;
            if evicted > 0 {
                debug!(evicted, "cache entries evicted");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> CacheStore {
        CacheStore::new(CacheConfig::default())
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = store();
        let key = keys::news_list();
        cache.set(&key, json!([{"id": 1}])).await;

        assert_eq!(cache.get(&key).await, Some(json!([{"id": 1}])));
        assert!(!cache.is_stale(&key).await);
    }

    #[tokio::test]
    async fn test_missing_key_is_stale() {
        let cache = store();
        assert!(cache.is_stale(&keys::session()).await);
    }

    #[tokio::test]
    async fn test_invalidate_marks_stale_but_still_servable() {
        let cache = store();
        let key = keys::news_list();
        cache.set(&key, json!(["a"])).await;

        cache.invalidate(&key).await;
        assert!(cache.is_stale(&key).await);
        // Stale data is still served until replaced.
        assert_eq!(cache.get(&key).await, Some(json!(["a"])));
    }

    #[tokio::test]
    async fn test_invalidate_prefix_reaches_nested_keys() {
        let cache = store();
        cache.set(&keys::stamp_history(2024, 4), json!([])).await;
        cache.set(&keys::stamp_history(2024, 5), json!([])).await;
        cache.set(&keys::news_list(), json!([])).await;

        cache.invalidate_prefix(&keys::stamps_root()).await;

        assert!(cache.is_stale(&keys::stamp_history(2024, 4)).await);
        assert!(cache.is_stale(&keys::stamp_history(2024, 5)).await);
        assert!(!cache.is_stale(&keys::news_list()).await);
    }

    #[tokio::test]
    async fn test_fetch_with_serves_fresh_entry_without_fetching() {
        let cache = store();
        let key = keys::session();
        cache.set(&key, json!({"authenticated": true})).await;

        let calls = AtomicUsize::new(0);
        let value = cache
            .fetch_with(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"authenticated": false}))
            })
            .await
            .unwrap();

        assert_eq!(value, json!({"authenticated": true}));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_with_refetches_stale_entry() {
        let cache = store();
        let key = keys::session();
        cache.set(&key, json!({"authenticated": true})).await;
        cache.invalidate(&key).await;

        let value = cache
            .fetch_with(&key, || async { Ok(json!({"authenticated": false})) })
            .await
            .unwrap();

        assert_eq!(value, json!({"authenticated": false}));
        assert!(!cache.is_stale(&key).await);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_does_not_write_back() {
        let cache = store();
        let key = keys::stamp_history(2024, 4);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let cache2 = cache.clone();
        let key2 = key.clone();
        let fetch = tokio::spawn(async move {
            cache2
                .fetch_with(&key2, || async {
                    rx.await.ok();
                    Ok(json!(["server"]))
                })
                .await
        });

        // An optimistic write cancels the in-flight fetch, then writes.
        tokio::task::yield_now().await;
        cache.cancel_queries(&key).await;
        cache.set(&key, json!(["optimistic"])).await;
        tx.send(()).unwrap();

        // The caller still gets the fetched value...
        assert_eq!(fetch.await.unwrap().unwrap(), json!(["server"]));
        // ...but the optimistic write survives in the cache.
        assert_eq!(cache.get(&key).await, Some(json!(["optimistic"])));
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_and_leaves_cache_untouched() {
        let cache = store();
        let key = keys::news_list();

        let result = cache
            .fetch_with(&key, || async {
                Err(TransportError::Status {
                    status: 500,
                    message: "boom".into(),
                })
            })
            .await;

        assert!(result.is_err());
        assert!(cache.snapshot(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_gc_evicts_idle_entries_only() {
        let cache = CacheStore::new(CacheConfig {
            gc_interval_seconds: 60,
            gc_time_ms: 1000,
            stale_time_ms: 500,
        });
        let key = keys::news_list();
        cache.set(&key, json!([])).await;

        // Not yet idle past the window.
        assert_eq!(cache.gc_sweep(Utc::now()).await, 0);

        let later = Utc::now() + chrono::Duration::milliseconds(1500);
        assert_eq!(cache.gc_sweep(later).await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_empties_store() {
        let cache = store();
        cache.set(&keys::news_list(), json!([])).await;
        cache.set(&keys::session(), json!({})).await;

        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
