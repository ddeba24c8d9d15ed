//! # Result Cache
//!
//! Fingerprint-keyed, TTL-based read-through cache shared by every engine
//! operation. Entries live in an optional durable `sled` store with an
//! in-memory hot layer in front of it.
//!
//! Concurrent callers asking for the same missing fingerprint are coalesced
//! onto one computation (single-flight). Failed computations are handed to
//! every coalesced waiter but never stored.

use super::Fingerprint;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info, warn};

/// Default time-to-live for cached results
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// A stored result with expiration support
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    /// JSON-encoded result
    pub payload: Vec<u8>,
    pub inserted_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    #[must_use]
    pub fn new(fingerprint: &Fingerprint, payload: Vec<u8>, ttl: Duration) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            payload,
            inserted_at: Utc::now(),
            ttl,
        }
    }

    /// Check if this entry has expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| self.inserted_at.checked_add_signed(ttl))
            .map_or(false, |expires_at| now >= expires_at)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests answered from a stored entry
    pub hits: u64,
    /// Requests that ran the computation
    pub misses: u64,
    /// Requests that awaited another caller's in-flight computation
    pub coalesced: u64,
    /// Entries dropped because their ttl had passed
    pub expirations: u64,
    /// Entries currently in the hot layer
    pub hot_entries: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage; coalesced requests count as hits
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let served = self.hits + self.coalesced;
        let total = served + self.misses;
        if total == 0 {
            0.0
        } else {
            (served as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    expirations: AtomicU64,
}

/// Value returned by [`ResultCache::get_or_compute`]
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: T,
    /// False only for the caller whose computation produced the value
    pub cache_hit: bool,
}

type Slot = Arc<OnceCell<Result<Arc<Vec<u8>>>>>;

/// Single-flight TTL cache
pub struct ResultCache {
    enabled: bool,
    ttl: Duration,
    hot: RwLock<HashMap<String, CacheEntry>>,
    store: Option<sled::Db>,
    in_flight: DashMap<String, Slot>,
    counters: Counters,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("enabled", &self.enabled)
            .field("ttl", &self.ttl)
            .field("durable", &self.store.is_some())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Memory-only cache
    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            hot: RwLock::new(HashMap::new()),
            store: None,
            in_flight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Cache backed by a sled database at `path`
    pub fn open(path: &Path, ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = sled::open(path)?;
        info!(
            "Opened durable cache at {} ({} stored entries)",
            path.display(),
            store.len()
        );

        Ok(Self {
            store: Some(store),
            ..Self::in_memory(ttl)
        })
    }

    /// Pass-through cache: every request computes, nothing is stored
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::in_memory(DEFAULT_TTL)
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `fingerprint`, or run `compute` exactly
    /// once across all concurrent callers and store its successful result.
    pub async fn get_or_compute<T, F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        compute: F,
    ) -> Result<Lookup<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.enabled {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            let value = compute().await?;
            return Ok(Lookup {
                value,
                cache_hit: false,
            });
        }

        if let Some(payload) = self.lookup(fingerprint).await? {
            if let Some(value) = self.decode::<T>(fingerprint, &payload).await {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!("Cache hit for {}", fingerprint);
                return Ok(Lookup {
                    value,
                    cache_hit: true,
                });
            }
        }

        let key = fingerprint.to_string();
        let slot: Slot = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let computed = AtomicBool::new(false);
        let computed_flag = &computed;
        let outcome = slot
            .get_or_init(|| async move {
                // a flight that finished between our lookup and joining the
                // slot has already stored its result
                if let Ok(Some(payload)) = self.lookup(fingerprint).await {
                    return Ok(Arc::new(payload));
                }

                computed_flag.store(true, Ordering::Relaxed);
                debug!("Cache miss for {}, computing", fingerprint);
                let value = compute().await?;
                let payload = serde_json::to_vec(&value)?;
                self.insert(fingerprint, payload.clone()).await?;
                Ok(Arc::new(payload))
            })
            .await
            .clone();

        self.in_flight
            .remove_if(&key, |_, current| Arc::ptr_eq(current, &slot));

        let computed = computed.load(Ordering::Relaxed);
        if computed {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        }

        let payload = outcome?;
        let value = serde_json::from_slice(&payload)?;
        Ok(Lookup {
            value,
            cache_hit: !computed,
        })
    }

    /// Remove every expired entry from both layers, returning how many
    /// distinct fingerprints were dropped
    pub async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut removed = BTreeSet::new();

        {
            let mut hot = self.hot.write().await;
            hot.retain(|key, entry| {
                let expired = entry.is_expired_at(now);
                if expired {
                    removed.insert(key.clone());
                }
                !expired
            });
        }

        if let Some(store) = &self.store {
            for item in store.iter() {
                let (key, bytes) = item?;
                let stale = bincode::deserialize::<CacheEntry>(&bytes)
                    .map_or(true, |entry| entry.is_expired_at(now));
                if stale {
                    store.remove(&key)?;
                    removed.insert(String::from_utf8_lossy(&key).into_owned());
                }
            }
            store.flush_async().await?;
        }

        self.counters
            .expirations
            .fetch_add(removed.len() as u64, Ordering::Relaxed);
        info!("Purged {} expired cache entries", removed.len());
        Ok(removed.len())
    }

    /// Drop every entry regardless of age
    pub async fn clear(&self) -> Result<()> {
        self.hot.write().await.clear();
        if let Some(store) = &self.store {
            store.clear()?;
            store.flush_async().await?;
        }
        info!("Cleared result cache");
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            expirations: self.counters.expirations.load(Ordering::Relaxed),
            hot_entries: self.hot.read().await.len(),
        }
    }

    /// Fetch a live payload, promoting durable hits into the hot layer
    async fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        let key = fingerprint.as_str();

        {
            let hot = self.hot.read().await;
            if let Some(entry) = hot.get(key) {
                if !entry.is_expired() {
                    return Ok(Some(entry.payload.clone()));
                }
            }
        }
        self.evict(key).await?;

        let Some(store) = &self.store else {
            return Ok(None);
        };
        let Some(bytes) = store.get(key)? else {
            return Ok(None);
        };

        match bincode::deserialize::<CacheEntry>(&bytes) {
            Ok(entry) if !entry.is_expired() => {
                let payload = entry.payload.clone();
                self.hot.write().await.insert(key.to_string(), entry);
                Ok(Some(payload))
            }
            Ok(_) => {
                self.counters.expirations.fetch_add(1, Ordering::Relaxed);
                store.remove(key)?;
                Ok(None)
            }
            Err(e) => {
                warn!("Dropping unreadable cache entry {}: {}", key, e);
                store.remove(key)?;
                Ok(None)
            }
        }
    }

    async fn insert(&self, fingerprint: &Fingerprint, payload: Vec<u8>) -> Result<()> {
        let entry = CacheEntry::new(fingerprint, payload, self.ttl);
        if let Some(store) = &self.store {
            let bytes = bincode::serialize(&entry)?;
            store.insert(fingerprint.as_str(), bytes)?;
            store.flush_async().await?;
        }
        self.hot
            .write()
            .await
            .insert(fingerprint.to_string(), entry);
        debug!("Cached result for {}", fingerprint);
        Ok(())
    }

    /// Remove an expired hot entry if one is present
    async fn evict(&self, key: &str) -> Result<()> {
        let mut hot = self.hot.write().await;
        if hot.get(key).is_some_and(CacheEntry::is_expired) {
            hot.remove(key);
            self.counters.expirations.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Decode a payload, discarding entries written with an older shape
    async fn decode<T: DeserializeOwned>(&self, fingerprint: &Fingerprint, payload: &[u8]) -> Option<T> {
        match serde_json::from_slice(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", fingerprint, e);
                self.hot.write().await.remove(fingerprint.as_str());
                if let Some(store) = &self.store {
                    if let Err(e) = store.remove(fingerprint.as_str()) {
                        warn!("Failed to remove cache entry {}: {}", fingerprint, Error::from(e));
                    }
                }
                None
            }
        }
    }
}
