//! In-process TTL + LRU cache with single-flight request collapsing.
//!
//! One implementation backs the filter-list, search-result, facet, and
//! config-lookup caches. Reads enforce TTL (stale entries are removed and
//! reported as a miss), writes evict the least-recently-accessed entry at
//! capacity, and a background sweeper clears expired entries so abandoned
//! keys do not pin memory until the next read. A process-wide flag turns the
//! whole layer off: `get` always misses and `set` is a no-op.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::entry::CacheEntry;
use crate::BuildError;

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type SharedBuild<T, E> = Shared<BoxFuture<'static, Result<T, BuildError<E>>>>;

/// Construction parameters for a [`QueryCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Name used in log lines (`"search"`, `"facets"`, ...).
    pub name: &'static str,
    pub ttl: Duration,
    pub max_size: usize,
    /// Shared kill switch; when `true` the cache behaves as permanently empty.
    pub disabled: Arc<AtomicBool>,
}

struct Inner<T, E> {
    name: &'static str,
    ttl: Duration,
    max_size: usize,
    disabled: Arc<AtomicBool>,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    inflight: Mutex<HashMap<String, SharedBuild<T, E>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// A TTL + LRU cache shared across requests.
///
/// `T` is the cached value; `E` is the error type of the single-flight
/// builder. Clones share the same underlying store.
pub struct QueryCache<T, E = std::convert::Infallible> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for QueryCache<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> QueryCache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: config.name,
                ttl: config.ttl,
                max_size: config.max_size.max(1),
                disabled: config.disabled,
                entries: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::Relaxed)
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry<T>>> {
        self.inner.entries.lock().expect("cache entries mutex poisoned")
    }

    /// Returns the cached value, enforcing TTL and updating LRU bookkeeping.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        if self.is_disabled() {
            return None;
        }
        let now = Instant::now();
        let mut entries = self.lock_entries();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => {
                entry.touch(now);
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    /// Stores a value under `key`, evicting the least-recently-accessed
    /// entry when the cache is full. No-op while disabled.
    pub fn set(&self, key: &str, value: T) {
        if self.is_disabled() {
            return;
        }
        let mut entries = self.lock_entries();
        while entries.len() >= self.inner.max_size && !entries.contains_key(key) {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            tracing::debug!(cache = self.inner.name, key = %oldest, "evicting LRU entry");
            entries.remove(&oldest);
        }
        entries.insert(key.to_string(), CacheEntry::new(value, self.inner.ttl));
    }

    /// Removes one entry; returns whether it existed.
    pub fn delete(&self, key: &str) -> bool {
        self.lock_entries().remove(key).is_some()
    }

    /// Snapshot of the live (possibly stale) keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock_entries().keys().cloned().collect()
    }

    /// Number of stored entries, stale included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Deletes all entries whose key matches `pattern` (`*` wildcards).
    /// Returns the number deleted.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(
                cache = self.inner.name,
                pattern,
                removed,
                "invalidated entries by pattern"
            );
        }
        removed
    }

    /// Removes expired entries; returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock_entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Starts the background sweeper. Replaces a previously running one.
    pub fn start_sweeper(&self, interval: Duration) {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = cache.sweep_expired();
                if removed > 0 {
                    tracing::debug!(
                        cache = cache.inner.name,
                        removed,
                        "sweeper removed expired entries"
                    );
                }
            }
        });
        let mut sweeper = self.inner.sweeper.lock().expect("sweeper mutex poisoned");
        if let Some(old) = sweeper.replace(handle) {
            old.abort();
        }
    }

    /// Stops the background sweeper; part of graceful shutdown.
    pub fn stop_sweeper(&self) {
        let mut sweeper = self.inner.sweeper.lock().expect("sweeper mutex poisoned");
        if let Some(handle) = sweeper.take() {
            handle.abort();
        }
    }

    /// Cache read with single-flight request collapsing.
    ///
    /// On a hit the cached value is returned. On a miss, at most one build
    /// runs per key at a time: concurrent callers wait on the same spawned
    /// computation and observe the same outcome. Because the build runs in a
    /// spawned task, a waiter that is cancelled does not cancel the build —
    /// it still completes and fills the cache for future callers.
    ///
    /// # Errors
    ///
    /// Returns the builder's error (shared among all waiters), or
    /// [`BuildError::Aborted`] if the build task panicked or was torn down.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, build: F) -> Result<T, BuildError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let shared = {
            let mut inflight = self
                .inner
                .inflight
                .lock()
                .expect("cache inflight mutex poisoned");
            if let Some(existing) = inflight.get(key) {
                existing.clone()
            } else {
                // Re-check under the lock: a racing build may have completed
                // between the miss above and acquiring the lock.
                if let Some(value) = self.get(key) {
                    return Ok(value);
                }
                let fut = build();
                let cache = self.clone();
                let task_key = key.to_string();
                let task = tokio::spawn(async move {
                    let result = fut.await;
                    if let Ok(value) = &result {
                        cache.set(&task_key, value.clone());
                    }
                    cache
                        .inner
                        .inflight
                        .lock()
                        .expect("cache inflight mutex poisoned")
                        .remove(&task_key);
                    result.map_err(Arc::new)
                });
                let shared: SharedBuild<T, E> = async move {
                    match task.await {
                        Ok(result) => result.map_err(BuildError::Build),
                        Err(_) => Err(BuildError::Aborted),
                    }
                }
                .boxed()
                .shared();
                inflight.insert(key.to_string(), shared.clone());
                shared
            }
        };

        shared.await
    }
}

/// Matches `key` against `pattern`, where `*` matches any run of characters.
/// A pattern without `*` must match exactly.
fn glob_match(pattern: &str, key: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == key;
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    let mut rest = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            let Some(stripped) = rest.strip_prefix(segment) else {
                return false;
            };
            rest = stripped;
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            let Some(pos) = rest.find(segment) else {
                return false;
            };
            rest = &rest[pos + segment.len()..];
        }
    }
    true
}
