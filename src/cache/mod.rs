//! Bounded, TTL-aware key-value cache with pluggable eviction.
//!
//! # Architecture
//!
//! - Values are opaque byte payloads (`Bytes`); `set_json`/`get_json` wrap
//!   them with `serde_json`.
//! - Expiry is lazy: an expired entry is removed by the `get` that misses on
//!   it, and by the periodic sweep ([`spawn_cleanup_task`]) for keys nobody
//!   reads again.
//! - At capacity, `set` first drops expired entries, then evicts one entry
//!   chosen by the configured [`EvictionPolicy`].
//! - The store sits behind one `parking_lot::Mutex`, so check-evict-insert
//!   in `set` and check-touch in `get` are atomic.
//!
//! Cache failures never reach the caller: (de)serialization problems turn a
//! `get` into a miss and a `set` into a no-op, with a log line and an
//! internal error metric.

mod entry;
mod flight;
mod pattern;
mod policy;
mod sweep;

pub use entry::EntryMetadata;
pub use pattern::KeyPattern;
pub use policy::EvictionPolicy;
pub use sweep::spawn_cleanup_task;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::metrics::InternalMetrics;
use entry::CacheEntry;
use flight::InFlight;

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, CacheEntry>,
    /// Logical clock for deterministic tie-breaks.
    clock: u64,
}

impl Store {
    #[inline]
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Administrative view of the cache (`getStats`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub policy: EvictionPolicy,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0 before the first lookup.
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    /// Sum of key and value sizes.
    pub memory_bytes: usize,
}

/// The cache engine. Construct once and share as `Arc<CacheEngine>`.
#[derive(Debug)]
pub struct CacheEngine {
    config: CacheConfig,
    store: Mutex<Store>,
    in_flight: InFlight,
    counters: Counters,
    metrics: Arc<InternalMetrics>,
}

impl CacheEngine {
    pub fn new(config: CacheConfig, metrics: Arc<InternalMetrics>) -> Self {
        debug!(
            max_entries = config.max_entries,
            policy = %config.eviction_policy,
            default_ttl = config.default_ttl_secs,
            "Cache engine initialized"
        );
        Self {
            config,
            store: Mutex::new(Store::default()),
            in_flight: InFlight::default(),
            counters: Counters::default(),
            metrics,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store `value` under `key`, replacing any previous entry and its
    /// metadata. `ttl` falls back to the configured default.
    pub fn set(&self, key: &str, value: impl Into<Bytes>, ttl: Option<Duration>) {
        let value = value.into();
        let ttl = ttl.unwrap_or_else(|| self.config.default_ttl());
        let now = Instant::now();

        let len = {
            let mut store = self.store.lock();
            if !store.entries.contains_key(key) && store.entries.len() >= self.config.max_entries {
                self.make_room(&mut store, now);
            }
            let seq = store.tick();
            store
                .entries
                .insert(key.to_string(), CacheEntry::new(value, now, ttl, seq));
            store.entries.len()
        };
        self.metrics.cache_entries.set(len as i64);
    }

    /// Fetch `key`, counting a hit or a miss.
    ///
    /// An expired entry is removed as part of the miss.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let found = self.lookup(key);
        if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.record_cache_lookup(found.is_some());
        found
    }

    /// Lookup without touching hit/miss statistics.
    fn lookup(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let mut store = self.store.lock();

        let expired = store.entries.get(key)?.is_expired(now);
        if expired {
            store.entries.remove(key);
            let len = store.entries.len();
            drop(store);
            self.record_expirations("lazy", 1, len);
            return None;
        }

        let seq = store.tick();
        let entry = store.entries.get_mut(key)?;
        entry.touch(now, seq);
        Some(entry.value.clone())
    }

    /// Presence check honoring expiry. Does not update access metadata.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.store
            .lock()
            .entries
            .get(key)
            .is_some_and(|e| !e.is_expired(now))
    }

    /// Bookkeeping for a live entry.
    pub fn metadata(&self, key: &str) -> Option<EntryMetadata> {
        let now = Instant::now();
        let store = self.store.lock();
        store
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.metadata(now))
    }

    /// Serialize `value` as JSON and store it.
    pub fn try_set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.set(key, payload, ttl);
        Ok(())
    }

    /// Serialize and store; a serialization failure is logged and the cache
    /// is left untouched.
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        if let Err(e) = self.try_set_json(key, value, ttl) {
            warn!(key = %key, error = %e, "Cache set skipped");
            self.metrics.record_cache_error("set", e.error_code());
        }
    }

    /// Fetch and deserialize. An undecodable payload is dropped and reported
    /// as a miss.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.get(key)?;
        match serde_json::from_slice(&payload) {
            Ok(value) => Some(value),
            Err(source) => {
                let e = CacheError::Serialization {
                    key: key.to_string(),
                    source,
                };
                warn!(key = %key, error = %e, "Cache entry could not be decoded, dropping");
                self.metrics.record_cache_error("get", e.error_code());
                self.delete(key);
                None
            }
        }
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// Concurrent misses on the same key each run `factory`; the last write
    /// wins. Use [`Self::get_or_compute_single_flight`] when the factory must
    /// run at most once per miss.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, factory: F, ttl: Option<Duration>) -> Bytes
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Bytes>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = factory().await;
        self.set(key, value.clone(), ttl);
        value
    }

    /// Fallible variant of [`Self::get_or_compute`]. Errors are returned to
    /// the caller and nothing is cached.
    pub async fn get_or_try_compute<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = factory().await?;
        self.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Like [`Self::get_or_compute`], but concurrent misses on one key share
    /// a single `factory` invocation.
    pub async fn get_or_compute_single_flight<F, Fut>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> Bytes
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Bytes>,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let cell = self.in_flight.join(key);
        let value = cell
            .get_or_init(|| async move {
                // A flight that finished between our miss and `join` already
                // populated the cache.
                if let Some(value) = self.lookup(key) {
                    return value;
                }
                let value = factory().await;
                self.set(key, value.clone(), ttl);
                value
            })
            .await
            .clone();
        self.in_flight.leave(key, &cell);
        value
    }

    /// Remove one key. Returns whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        let (removed, len) = {
            let mut store = self.store.lock();
            let removed = store.entries.remove(key).is_some();
            (removed, store.entries.len())
        };
        self.metrics.cache_entries.set(len as i64);
        removed
    }

    /// Empty the store. Returns the number of entries dropped.
    pub fn clear(&self) -> usize {
        let removed = {
            let mut store = self.store.lock();
            let n = store.entries.len();
            store.entries.clear();
            n
        };
        self.metrics.cache_entries.set(0);
        debug!(removed, "Cache cleared");
        removed
    }

    /// Remove every key matching `pattern`. Returns the count removed.
    pub fn invalidate_by_pattern(&self, pattern: &KeyPattern) -> usize {
        let (removed, len) = {
            let mut store = self.store.lock();
            let before = store.entries.len();
            store.entries.retain(|key, _| !pattern.matches(key));
            (before - store.entries.len(), store.entries.len())
        };
        self.metrics.cache_entries.set(len as i64);
        debug!(removed, ?pattern, "Cache entries invalidated");
        removed
    }

    /// Remove every expired entry regardless of access. Returns the count.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let (removed, len) = {
            let mut store = self.store.lock();
            let before = store.entries.len();
            store.entries.retain(|_, e| !e.is_expired(now));
            (before - store.entries.len(), store.entries.len())
        };
        self.record_expirations("sweep", removed, len);
        removed
    }

    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let (entries, memory_bytes) = {
            let store = self.store.lock();
            let memory = store
                .entries
                .iter()
                .map(|(k, e)| k.len() + e.size_bytes())
                .sum();
            (store.entries.len(), memory)
        };
        let hits = self.counters.hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries,
            max_entries: self.config.max_entries,
            policy: self.config.eviction_policy,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            memory_bytes,
        }
    }

    /// Free one slot: expired entries go first, then the policy victim.
    fn make_room(&self, store: &mut Store, now: Instant) {
        let before = store.entries.len();
        store.entries.retain(|_, e| !e.is_expired(now));
        let purged = before - store.entries.len();
        if purged > 0 {
            self.counters
                .expirations
                .fetch_add(purged as u64, Ordering::Relaxed);
            self.metrics
                .cache_expirations
                .with_label_values(&["capacity"])
                .inc_by(purged as u64);
        }

        while store.entries.len() >= self.config.max_entries {
            let policy = self.config.eviction_policy;
            let Some(victim) = policy
                .select_victim(store.entries.iter())
                .map(str::to_string)
            else {
                break;
            };
            store.entries.remove(&victim);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            self.metrics
                .cache_evictions
                .with_label_values(&[policy.as_str()])
                .inc();
            debug!(key = %victim, policy = %policy, "Cache entry evicted");
        }
    }

    fn record_expirations(&self, path: &str, removed: usize, len: usize) {
        if removed > 0 {
            self.counters
                .expirations
                .fetch_add(removed as u64, Ordering::Relaxed);
            self.metrics
                .cache_expirations
                .with_label_values(&[path])
                .inc_by(removed as u64);
        }
        self.metrics.cache_entries.set(len as i64);
    }
}
