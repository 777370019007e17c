//! Shape cache implementation.

use super::key::{blob_path, hash_key, key_from_blob_path, normalize_key};
use super::store::BlobStore;
use crate::config::CacheConfig;
use crate::models::GenerationResult;
use futures::stream::{self, StreamExt};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Cache hit/miss counters and latency averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub storage_hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub avg_memory_hit_ms: f64,
    pub avg_storage_hit_ms: f64,
    pub avg_miss_ms: f64,
    pub memory_entries: usize,
    pub memory_capacity: usize,
    /// Durable backend name, if one is in use.
    pub backend: Option<String>,
    pub connected: bool,
    pub tracked_keys: usize,
    pub collisions_detected: u64,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: u64,
    storage_hits: u64,
    misses: u64,
    memory_ms: f64,
    storage_ms: f64,
    miss_ms: f64,
    collisions: u64,
}

enum Lookup {
    Memory,
    Storage,
    Miss,
}

/// In-memory results keyed by normalized-text hash, backed by an optional
/// durable blob store.
pub struct ShapeCache {
    memory: Mutex<LruCache<String, GenerationResult>>,
    capacity: usize,
    store: Option<Arc<dyn BlobStore>>,
    /// A durable backend was requested, whether or not it answered.
    configured: bool,
    in_flight: Mutex<HashMap<String, watch::Receiver<bool>>>,
    key_origins: Mutex<HashMap<String, String>>,
    counters: Mutex<Counters>,
}

/// Removes the in-flight entry and wakes waiters however the resolver exits.
struct ResolveGuard<'a> {
    cache: &'a ShapeCache,
    key: String,
    done: watch::Sender<bool>,
}

impl Drop for ResolveGuard<'_> {
    fn drop(&mut self) {
        lock(&self.cache.in_flight).remove(&self.key);
        self.done.send_replace(true);
    }
}

enum Role<'a> {
    Resolver(ResolveGuard<'a>),
    Waiter(watch::Receiver<bool>),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ShapeCache {
    /// Memory-only cache.
    pub fn memory_only(capacity: usize) -> Self {
        Self::build(capacity, None, false)
    }

    /// Cache backed by `store`.
    ///
    /// The backend is probed once; if the probe fails the cache runs
    /// memory-only and reports itself as disconnected.
    pub async fn connect(capacity: usize, store: Arc<dyn BlobStore>) -> Self {
        match store.check_connection().await {
            Ok(()) => {
                info!("Result cache connected to {} blob store", store.name());
                Self::build(capacity, Some(store), true)
            }
            Err(e) => {
                warn!(
                    "Blob store {} unreachable, running memory-only: {}",
                    store.name(),
                    e
                );
                Self::build(capacity, None, true)
            }
        }
    }

    fn build(capacity: usize, store: Option<Arc<dyn BlobStore>>, configured: bool) -> Self {
        let bounded = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            memory: Mutex::new(LruCache::new(bounded)),
            capacity: bounded.get(),
            store,
            configured,
            in_flight: Mutex::new(HashMap::new()),
            key_origins: Mutex::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// True unless a configured durable backend failed its startup probe.
    pub fn is_connected(&self) -> bool {
        self.store.is_some() || !self.configured
    }

    pub fn has_durable_tier(&self) -> bool {
        self.store.is_some()
    }

    /// Look up a result by raw text.
    pub async fn get(&self, text: &str) -> Option<GenerationResult> {
        let start = Instant::now();
        let key = hash_key(&normalize_key(text));

        if let Some(hit) = lock(&self.memory).get(&key).cloned() {
            self.record(Lookup::Memory, start);
            debug!(key = %key, "memory cache hit");
            return Some(hit);
        }

        let Some(store) = self.store.as_ref() else {
            self.record(Lookup::Miss, start);
            return None;
        };

        let role = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(done) => Role::Waiter(done.clone()),
                None => {
                    let (tx, rx) = watch::channel(false);
                    in_flight.insert(key.clone(), rx);
                    Role::Resolver(ResolveGuard {
                        cache: self,
                        key: key.clone(),
                        done: tx,
                    })
                }
            }
        };

        match role {
            Role::Waiter(mut done) => {
                // A closed channel also means the resolver finished.
                let _ = done.wait_for(|finished| *finished).await;
                let hit = lock(&self.memory).get(&key).cloned();
                let outcome = if hit.is_some() {
                    Lookup::Memory
                } else {
                    Lookup::Miss
                };
                self.record(outcome, start);
                hit
            }
            Role::Resolver(guard) => {
                let found = self.read_durable(store.as_ref(), &key).await;
                if let Some(result) = &found {
                    lock(&self.memory).put(key.clone(), result.clone());
                }
                drop(guard);
                let outcome = if found.is_some() {
                    debug!(key = %key, "storage cache hit");
                    Lookup::Storage
                } else {
                    Lookup::Miss
                };
                self.record(outcome, start);
                found
            }
        }
    }

    /// Store a result under the key derived from `text`.
    ///
    /// The memory write always happens; the durable write is best-effort.
    pub async fn set(&self, text: &str, result: &GenerationResult) {
        let normalized = normalize_key(text);
        let key = hash_key(&normalized);
        self.track_key_origin(&key, &normalized);

        lock(&self.memory).put(key.clone(), result.clone());

        let Some(store) = self.store.as_ref() else {
            return;
        };
        let body = match serde_json::to_string(result) {
            Ok(body) => body,
            Err(e) => {
                warn!(key = %key, "Failed to serialize result for storage: {}", e);
                return;
            }
        };
        match store.upload_text(&blob_path(&key), &body).await {
            Ok(()) => debug!(key = %key, "stored result in {}", store.name()),
            Err(e) => warn!(key = %key, "Failed to store result: {}", e),
        }
    }

    /// Memory-tier probe that leaves stats and recency untouched.
    pub fn contains(&self, text: &str) -> bool {
        let key = hash_key(&normalize_key(text));
        lock(&self.memory).contains(&key)
    }

    /// Pull one concept from the durable tier into memory.
    pub async fn preload(&self, text: &str) -> bool {
        let key = hash_key(&normalize_key(text));
        if lock(&self.memory).contains(&key) {
            return true;
        }
        let Some(store) = self.store.as_ref() else {
            return false;
        };
        match self.read_durable(store.as_ref(), &key).await {
            Some(result) => {
                lock(&self.memory).put(key, result);
                true
            }
            None => false,
        }
    }

    /// Warm the memory tier with every stored result. Returns how many loaded.
    ///
    /// When more results are stored than fit, the last ones listed win.
    pub async fn load_all(&self) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        let paths = match store.list(CacheConfig::BLOB_PREFIX).await {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Failed to list stored results: {}", e);
                return 0;
            }
        };

        // `buffered` keeps listing order, so later entries still win.
        let keys: Vec<String> = paths
            .iter()
            .filter_map(|p| key_from_blob_path(p))
            .map(str::to_string)
            .collect();
        let mut reads = stream::iter(keys)
            .map(|key: String| async move {
                let result = self.read_durable(store.as_ref(), &key).await;
                (key, result)
            })
            .buffered(CacheConfig::WARMUP_CONCURRENCY);
        let mut loaded = 0;
        while let Some((key, result)) = reads.next().await {
            if let Some(result) = result {
                lock(&self.memory).put(key.to_string(), result);
                loaded += 1;
            }
        }
        info!("Loaded {} of {} stored results into memory", loaded, paths.len());
        loaded
    }

    /// Number of results in the durable tier; 0 when unavailable.
    pub async fn count_stored(&self) -> usize {
        let Some(store) = self.store.as_ref() else {
            return 0;
        };
        match store.list(CacheConfig::BLOB_PREFIX).await {
            Ok(paths) => paths
                .iter()
                .filter(|p| key_from_blob_path(p).is_some())
                .count(),
            Err(e) => {
                warn!("Failed to count stored results: {}", e);
                0
            }
        }
    }

    pub fn clear_memory(&self) {
        lock(&self.memory).clear();
    }

    pub fn memory_len(&self) -> usize {
        lock(&self.memory).len()
    }

    pub fn stats(&self) -> CacheStats {
        let memory_entries = self.memory_len();
        let tracked_keys = lock(&self.key_origins).len();
        let counters = lock(&self.counters);
        let total = counters.memory_hits + counters.storage_hits + counters.misses;
        let avg = |sum: f64, n: u64| if n == 0 { 0.0 } else { sum / n as f64 };
        CacheStats {
            memory_hits: counters.memory_hits,
            storage_hits: counters.storage_hits,
            misses: counters.misses,
            total_requests: total,
            hit_rate: (counters.memory_hits + counters.storage_hits) as f64 / total.max(1) as f64,
            avg_memory_hit_ms: avg(counters.memory_ms, counters.memory_hits),
            avg_storage_hit_ms: avg(counters.storage_ms, counters.storage_hits),
            avg_miss_ms: avg(counters.miss_ms, counters.misses),
            memory_entries,
            memory_capacity: self.capacity,
            backend: self.store.as_ref().map(|s| s.name().to_string()),
            connected: self.is_connected(),
            tracked_keys,
            collisions_detected: counters.collisions,
        }
    }

    async fn read_durable(&self, store: &dyn BlobStore, key: &str) -> Option<GenerationResult> {
        let body = match store.download_text(&blob_path(key)).await {
            Ok(Some(body)) => body,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, "Durable cache read failed: {}", e);
                return None;
            }
        };
        match serde_json::from_str(&body) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(key = %key, "Discarding unreadable stored result: {}", e);
                None
            }
        }
    }

    /// Remember which normalized text produced `key`, logging collisions.
    fn track_key_origin(&self, key: &str, normalized: &str) {
        let collided = {
            let mut origins = lock(&self.key_origins);
            match origins.get(key) {
                Some(previous) if previous != normalized => {
                    warn!(
                        key = %key,
                        "Cache key collision: '{}' and '{}' hash to the same key",
                        previous,
                        normalized
                    );
                    true
                }
                Some(_) => false,
                None => {
                    if origins.len() < CacheConfig::KEY_ORIGINS_MAX {
                        origins.insert(key.to_string(), normalized.to_string());
                    }
                    false
                }
            }
        };
        if collided {
            lock(&self.counters).collisions += 1;
        }
    }

    fn record(&self, lookup: Lookup, start: Instant) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let mut counters = lock(&self.counters);
        match lookup {
            Lookup::Memory => {
                counters.memory_hits += 1;
                counters.memory_ms += elapsed_ms;
            }
            Lookup::Storage => {
                counters.storage_hits += 1;
                counters.storage_ms += elapsed_ms;
            }
            Lookup::Miss => {
                counters.misses += 1;
                counters.miss_ms += elapsed_ms;
            }
        }
    }
}
