// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TTL-keyed read-through cache.
//!
//! Entries are never served once `now - timestamp >= ttl`; stale entries are
//! evicted lazily by the lookup that finds them. Writes never populate the
//! cache: callers invalidate after a successful write so the next read
//! re-fetches authoritative data.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use courier_config::CacheConfig;
use courier_core::CourierError;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::stats::{QueryStats, QueryStatsSummary};

/// A cached value with its insertion time and lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub data: V,
    pub timestamp: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) < self.ttl
    }
}

/// Read-through cache keyed by query signature.
pub struct QueryCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    stats: Mutex<HashMap<String, QueryStats>>,
    /// Bumped by every invalidation; a fetch that straddles one is not cached.
    epoch: AtomicU64,
    default_ttl: Duration,
    window: usize,
    latency_target: Duration,
}

impl<V: Clone + Send + Sync> QueryCache<V> {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            stats: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
            default_ttl: config.default_ttl(),
            window: config.metrics_window,
            latency_target: config.latency_target(),
        }
    }

    /// Returns the cached value for `key`, or calls `fetch`, caches and returns its result.
    ///
    /// `ttl` overrides the configured default. Fetch errors are returned as-is
    /// and nothing is cached.
    pub async fn read<F, Fut>(
        &self,
        key: &str,
        query_type: &str,
        ttl: Option<Duration>,
        fetch: F,
    ) -> Result<V, CourierError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, CourierError>>,
    {
        let started = Instant::now();

        if let Some(data) = self.lookup(key, started) {
            self.record(query_type, started.elapsed(), true);
            return Ok(data);
        }

        let epoch = self.epoch.load(Ordering::Acquire);
        let data = fetch().await?;

        if self.epoch.load(Ordering::Acquire) == epoch {
            self.entries.insert(
                key.to_string(),
                CacheEntry {
                    data: data.clone(),
                    timestamp: Instant::now(),
                    ttl: ttl.unwrap_or(self.default_ttl),
                },
            );
        } else {
            debug!(key, "cache invalidated during fetch; result not cached");
        }

        self.record(query_type, started.elapsed(), false);
        Ok(data)
    }

    fn lookup(&self, key: &str, now: Instant) -> Option<V> {
        let stale = match self.entries.get(key) {
            Some(entry) if entry.is_fresh(now) => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };
        if stale {
            self.entries.remove_if(key, |_, entry| !entry.is_fresh(now));
            debug!(key, "evicted expired cache entry");
        }
        None
    }

    /// Drops one key. Returns whether it was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.remove(key).is_some()
    }

    /// Drops every key starting with `prefix`. Returns how many were cached.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&self, query_type: &str, elapsed: Duration, hit: bool) {
        if elapsed > self.latency_target {
            warn!(
                query_type,
                elapsed_ms = elapsed.as_millis() as u64,
                target_ms = self.latency_target.as_millis() as u64,
                hit,
                "cache read exceeded latency target"
            );
        }

        #[cfg(feature = "prometheus")]
        courier_prometheus::record_cache_read(query_type, hit, elapsed);

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats
            .entry(query_type.to_string())
            .or_insert_with(|| QueryStats::new(self.window))
            .record(elapsed, hit);
    }

    /// Statistics for one query type, if it has been read at least once.
    pub fn stats(&self, query_type: &str) -> Option<QueryStatsSummary> {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.get(query_type).map(|s| s.summary(query_type))
    }

    /// Statistics for every query type seen, sorted by name.
    pub fn all_stats(&self) -> Vec<QueryStatsSummary> {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<_> = stats.iter().map(|(k, s)| s.summary(k)).collect();
        out.sort_by(|a, b| a.query_type.cmp(&b.query_type));
        out
    }

    /// Query types whose windowed p95 exceeds the configured latency target.
    pub fn slow_query_types(&self) -> Vec<String> {
        self.all_stats()
            .into_iter()
            .filter(|s| s.p95 > self.latency_target)
            .map(|s| s.query_type)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn cache() -> QueryCache<Vec<u32>> {
        QueryCache::new(&CacheConfig::default())
    }

    async fn counted(calls: &AtomicUsize, value: Vec<u32>) -> Result<Vec<u32>, CourierError> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }

    #[tokio::test(start_paused = true)]
    async fn hit_within_ttl_skips_fetch() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        let first = cache
            .read("k", "q", Some(Duration::from_secs(10)), || counted(&calls, vec![1]))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        let second = cache
            .read("k", "q", None, || counted(&calls, vec![2]))
            .await
            .unwrap();

        assert_eq!(first, vec![1]);
        assert_eq!(second, vec![1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats("q").unwrap();
        assert_eq!(stats.count, 2);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn entry_expires_exactly_at_ttl() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        let ttl = Some(Duration::from_secs(5));

        cache.read("k", "q", ttl, || counted(&calls, vec![1])).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let value = cache.read("k", "q", ttl, || counted(&calls, vec![2])).await.unwrap();

        assert_eq!(value, vec![2]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_evicted_on_lookup() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        cache
            .read("k", "q", Some(Duration::from_secs(1)), || counted(&calls, vec![1]))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.len(), 1);
        assert!(cache.lookup("k", Instant::now()).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn read_after_invalidation_refetches() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        cache.read("k", "q", None, || counted(&calls, vec![1])).await.unwrap();
        assert!(cache.invalidate("k"));
        let value = cache.read("k", "q", None, || counted(&calls, vec![2])).await.unwrap();

        assert_eq!(value, vec![2]);
        assert!(!cache.invalidate("missing"));
    }

    #[tokio::test]
    async fn prefix_invalidation_spares_other_keys() {
        let cache = cache();
        let calls = AtomicUsize::new(0);
        for key in ["a:1", "a:2", "b:1"] {
            cache.read(key, "q", None, || counted(&calls, vec![0])).await.unwrap();
        }

        assert_eq!(cache.invalidate_prefix("a:"), 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn fetch_errors_are_not_cached() {
        let cache = cache();
        let err = cache
            .read("k", "q", None, || async { Err(CourierError::store("down")) })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidation_during_fetch_discards_result() {
        let cache = Arc::new(cache());
        let gate = Arc::new(tokio::sync::Notify::new());

        let reader = {
            let cache = Arc::clone(&cache);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                cache
                    .read("k", "q", None, || async move {
                        gate.notified().await;
                        Ok(vec![1])
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        cache.invalidate("k");
        gate.notify_one();

        assert_eq!(reader.await.unwrap().unwrap(), vec![1]);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_reads_are_flagged() {
        let cache = cache();
        cache
            .read("k", "slow", None, || async {
                tokio::time::sleep(Duration::from_millis(250)).await;
                Ok(vec![1])
            })
            .await
            .unwrap();
        cache.read("j", "fast", None, || async { Ok(vec![2]) }).await.unwrap();

        assert_eq!(cache.slow_query_types(), vec!["slow".to_string()]);
        assert_eq!(cache.all_stats().len(), 2);
    }
}
