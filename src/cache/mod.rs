// src/cache/mod.rs

//! Read-through TTL cache for query results.
//!
//! The cache shortens the effective load for frequent reads: handlers
//! wrap their query in [`QueryCache::cache_query`], which serves a cached
//! value while it is fresh and otherwise runs the wrapped executor.
//! Executor failures and empty results are converted into a configured
//! per-prefix default value instead of being propagated, trading
//! correctness for availability on the read path. Write handlers call
//! [`QueryCache::invalidate_pattern`] after a confirmed mutation.
//!
//! Concurrent misses for the same key are not deduplicated; two
//! simultaneous misses may both run the executor.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::BackgroundTask;

/// Build a canonical cache key from a prefix and named parameters.
///
/// Parameters are sorted by name so logically identical queries map to
/// the same key regardless of call-site argument ordering.
pub fn build_key(prefix: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut key = String::from(prefix);
    for (name, value) in sorted {
        key.push(':');
        key.push_str(name);
        key.push('=');
        key.push_str(value);
    }
    key
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// Epoch millis after which the entry is no longer served
    expires_at: u64,
}

/// Cache counters for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    /// Rough footprint: key lengths plus serialized value lengths
    pub memory_estimate_bytes: usize,
}

/// Bounded TTL cache with read-through semantics.
#[derive(Debug)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    config: CacheConfig,
    clock: SharedClock,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl QueryCache {
    /// Creates a new cache with the given configuration and clock
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Get a cached value, or `None` if absent or expired.
    ///
    /// Expired entries are removed on access.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_millis();

        {
            let entries = self.entries.read().expect("cache lock poisoned");
            match entries.get(key) {
                Some(entry) if now < entry.expires_at => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => {
                    // Expired: fall through to remove under the write lock
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store a value under `key` for `ttl` (the configured default when
    /// `None`). Replaces any existing entry in place; inserting a new key
    /// at capacity first evicts the entry closest to expiry.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let now = self.clock.now_millis();
        let expires_at = now + ttl.as_millis() as u64;

        let mut entries = self.entries.write().expect("cache lock poisoned");

        if !entries.contains_key(key) && entries.len() >= self.config.max_size {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                entries.remove(&victim);
                trace!(key = %victim, "Evicted nearest-expiry cache entry");
            }
        }

        entries.insert(key.to_string(), CacheEntry { value, expires_at });
    }

    /// Remove one entry; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Remove every entry whose key contains `pattern`.
    ///
    /// Called by write handlers after a confirmed mutation, e.g.
    /// `invalidate_pattern("equipment:")` after an equipment update.
    /// Returns the number of entries removed.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.entries.write().expect("cache lock poisoned");

        let before = entries.len();
        entries.retain(|key, _| !key.contains(pattern));
        let removed = before - entries.len();

        if removed > 0 {
            debug!(pattern = pattern, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.write().expect("cache lock poisoned").clear();
    }

    /// Purge expired entries that have not been touched by `get`.
    pub fn sweep(&self) {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().expect("cache lock poisoned");

        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
    }

    /// Fallback value for a key: the longest configured prefix match,
    /// `null` when none is configured.
    fn default_for(&self, key: &str) -> Value {
        self.config
            .prefix_defaults
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)
    }

    /// Read-through wrapper around a query executor.
    ///
    /// On a hit the cached value is returned without running `executor`.
    /// On a miss the executor runs: a non-null result is cached under
    /// `ttl` and returned; a null result or an executor error yields the
    /// per-prefix default value and caches nothing, so the next call
    /// retries the store. Executor errors are logged, never propagated;
    /// callers that need a confirmed result must bypass the cache.
    pub async fn cache_query<F, Fut>(&self, key: &str, ttl: Option<Duration>, executor: F) -> Value
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(value) = self.get(key) {
            trace!(key = key, "Cache hit");
            return value;
        }

        match executor().await {
            Ok(value) if !value.is_null() => {
                self.set(key, value.clone(), ttl);
                trace!(key = key, "Cache miss, stored executor result");
                value
            }
            Ok(_) => {
                trace!(key = key, "Executor returned no data, serving default");
                self.default_for(key)
            }
            Err(e) => {
                // The original error stays local; callers get the default
                warn!(key = key, error = %e, "Executor failed, serving default value");
                self.default_for(key)
            }
        }
    }

    /// Number of entries currently stored (including not-yet-swept
    /// expired ones).
    pub fn size(&self) -> usize {
        self.entries.read().expect("cache lock poisoned").len()
    }

    /// Snapshot for the stats endpoint.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().expect("cache lock poisoned");

        let memory_estimate_bytes = entries
            .iter()
            .map(|(key, entry)| {
                key.len()
                    + serde_json::to_string(&entry.value)
                        .map(|s| s.len())
                        .unwrap_or(0)
            })
            .sum();

        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let hit_rate = if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        };

        CacheStats {
            size: entries.len(),
            hits,
            misses,
            hit_rate,
            memory_estimate_bytes,
        }
    }

    /// Start the background sweep task.
    pub fn start_sweeper(self: &Arc<Self>) -> BackgroundTask {
        let cache = Arc::clone(self);
        BackgroundTask::spawn("cache-sweep", self.config.sweep_interval, move || {
            let cache = Arc::clone(&cache);
            async move {
                cache.sweep();
            }
        })
    }
}
