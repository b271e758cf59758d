//! Content-addressed TTL cache with single-flight fetch deduplication.
//!
//! Payloads are stored as JSON values so one cache instance can hold any
//! serializable provider response. Callers always receive their own
//! deserialized copy; an entry that no longer deserializes is treated as
//! corrupt, evicted, and re-fetched.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use signal_core::{SignalError, SignalResult};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Identity of one external fetch: source + keyword + request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source: String,
    keyword: String,
    params: Vec<(String, String)>,
}

impl CacheKey {
    pub fn new(source: &str, keyword: &str) -> Self {
        Self {
            source: source.to_string(),
            keyword: keyword.trim().to_lowercase(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// SHA-256 content address; parameter order does not matter
    pub fn address(&self) -> String {
        let mut params = self.params.clone();
        params.sort();
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(b"|");
        hasher.update(self.keyword.as_bytes());
        for (name, value) in &params {
            hasher.update(b"|");
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.keyword)?;
        for (name, value) in &self.params {
            write!(f, ":{}={}", name, value)?;
        }
        Ok(())
    }
}

/// Internal cache entry with timestamp
struct CacheEntry {
    payload: serde_json::Value,
    fetched_at: DateTime<Utc>,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

type SharedFetch = Shared<BoxFuture<'static, SignalResult<serde_json::Value>>>;

/// A fetch running on its own task, and how many callers are still waiting on it
struct InflightFetch {
    id: u64,
    shared: SharedFetch,
    waiters: AtomicUsize,
    abort: AbortHandle,
}

#[derive(Default)]
struct CacheInner {
    entries: DashMap<String, CacheEntry>,
    inflight: DashMap<String, InflightFetch>,
    next_fetch_id: AtomicU64,
}

/// Registration of one caller on an in-flight fetch.
///
/// When the last waiter goes away before the fetch finishes, the fetch is
/// aborted and its slot released so nothing keeps running for nobody.
struct Waiter {
    inner: Arc<CacheInner>,
    address: String,
    fetch_id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        // Count changes only happen under the shard lock, so a joining caller cannot slip in between
        let abandoned = self.inner.inflight.remove_if(&self.address, |_, fetch| {
            fetch.id == self.fetch_id && fetch.waiters.fetch_sub(1, Ordering::SeqCst) == 1
        });
        if let Some((_, fetch)) = abandoned {
            tracing::debug!("Abandoned fetch {} for {}, aborting", fetch.id, self.address);
            fetch.abort.abort();
        }
    }
}

/// Process-wide cache shared by all analyzers. Cloning shares the same storage.
#[derive(Clone, Default)]
pub struct SignalCache {
    inner: Arc<CacheInner>,
}

impl SignalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the fresh cached payload for `key`, or run `fetch_fn` once and cache its result.
    ///
    /// Concurrent callers for the same key while a fetch is running share that fetch's
    /// outcome. Failures are never cached; every waiter receives the same error.
    /// The fetch runs on its own task: dropping one waiter detaches it without
    /// cancelling the fetch for the others, and dropping the last one aborts it.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch_fn: F) -> SignalResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = SignalResult<T>> + Send + 'static,
    {
        let address = key.address();
        if let Some(hit) = self.lookup::<T>(&address) {
            tracing::debug!("Cache hit for {}", key);
            return Ok(hit);
        }

        let (fetch, _waiter) = match self.inner.inflight.entry(address.clone()) {
            Entry::Occupied(running) => {
                tracing::debug!("Joining in-flight fetch for {}", key);
                let running = running.get();
                running.waiters.fetch_add(1, Ordering::SeqCst);
                (running.shared.clone(), self.waiter(&address, running.id))
            }
            Entry::Vacant(slot) => {
                // A fetch may have stored its result between the lookup and taking this slot
                if let Some(hit) = self.lookup::<T>(&address) {
                    return Ok(hit);
                }
                tracing::debug!("Cache miss for {}, fetching", key);
                let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                let running = self.spawn_fetch(address.clone(), id, ttl, fetch_fn());
                let shared = running.shared.clone();
                slot.insert(running);
                (shared, self.waiter(&address, id))
            }
        };

        let payload = fetch.await?;
        serde_json::from_value(payload).map_err(|e| {
            SignalError::CacheCorruption(format!("payload for {} does not match the requested type: {}", key, e))
        })
    }

    fn waiter(&self, address: &str, fetch_id: u64) -> Waiter {
        Waiter {
            inner: Arc::clone(&self.inner),
            address: address.to_string(),
            fetch_id,
        }
    }

    /// Start `fut` on its own task with one registered waiter.
    fn spawn_fetch<T, Fut>(&self, address: String, id: u64, ttl: Duration, fut: Fut) -> InflightFetch
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = SignalResult<T>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let result = fut.await.and_then(|value| {
                serde_json::to_value(&value).map_err(|e| SignalError::CacheCorruption(e.to_string()))
            });
            if let Ok(payload) = &result {
                inner.entries.insert(
                    address.clone(),
                    CacheEntry {
                        payload: payload.clone(),
                        fetched_at: Utc::now(),
                        stored_at: Instant::now(),
                        ttl,
                    },
                );
            }
            // Entry is stored before the slot is released so late callers find it
            inner.inflight.remove_if(&address, |_, running| running.id == id);
            result
        });

        let abort = task.abort_handle();
        let shared = async move {
            task.await.unwrap_or_else(|e| {
                Err(SignalError::ProviderUnavailable(format!("fetch task ended early: {}", e)))
            })
        }
        .boxed()
        .shared();

        InflightFetch {
            id,
            shared,
            waiters: AtomicUsize::new(1),
            abort,
        }
    }

    /// Fresh payload for `address`; expired or undecodable entries are evicted.
    fn lookup<T: DeserializeOwned>(&self, address: &str) -> Option<T> {
        let now = Instant::now();
        let payload = {
            let entry = self.inner.entries.get(address)?;
            if entry.is_fresh(now) {
                Some(entry.payload.clone())
            } else {
                None
            }
        };

        let Some(payload) = payload else {
            self.inner.entries.remove_if(address, |_, e| !e.is_fresh(now));
            return None;
        };

        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Evicting corrupt cache entry {}: {}", address, e);
                self.inner.entries.remove(address);
                None
            }
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, e| e.is_fresh(now));
        before.saturating_sub(self.inner.entries.len())
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.inner.entries.remove(&key.address()).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn inflight_count(&self) -> usize {
        self.inner.inflight.len()
    }

    /// When the cached payload for `key` was fetched, if still fresh
    pub fn fetched_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let now = Instant::now();
        self.inner
            .entries
            .get(&key.address())
            .filter(|e| e.is_fresh(now))
            .map(|e| e.fetched_at)
    }
}
