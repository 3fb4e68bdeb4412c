//! Persistent response cache.
//!
//! [`ResponseCache`] stores normalized [`DomainResult`]s in the shared
//! [`KvStore`] under [`CACHE_PREFIX`]. Lookups happen before rate admission
//! and before any provider is touched, so a hit costs no tokens.
//!
//! # Expiry
//!
//! An entry is valid while `now - stored_at < ttl`. Expired entries are
//! reported as misses and deleted on the read that discovers them.
//!
//! # Size bound
//!
//! Eviction is a bulk sweep, not LRU. When [`put`](ResponseCache::put) finds
//! more than `high_water_mark` entries it drops the oldest
//! `ceil(count * evict_fraction)` entries by insertion order in a single
//! `remove_many` call, then inserts. Reads never reorder entries. With the
//! defaults, a store holding 151 entries drops 51 and ends at 101 after the
//! insert.
//!
//! Store failures degrade to cache misses; the cache never fails a request.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::key::{CACHE_PREFIX, CacheKey, SignatureMode};
use crate::clock::{Clock, SystemClock};
use crate::store::KvStore;
use crate::telemetry;
use crate::types::{DomainResult, Mode};

/// Configuration for the response cache.
///
/// ```rust
/// # use huginn::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .high_water_mark(500)
///     .ttl(Duration::from_secs(3600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Time-to-live for cached entries. Default: 24 hours.
    pub ttl: Duration,
    /// Entry count above which `put` sweeps. Default: 150.
    pub high_water_mark: usize,
    /// Share of entries dropped per sweep. Default: one third.
    pub evict_fraction: f64,
    /// How much of the content feeds the key. Default: sampled.
    pub signature: SignatureMode,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            high_water_mark: 150,
            evict_fraction: 1.0 / 3.0,
            signature: SignatureMode::Sampled,
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the entry count that triggers a sweep.
    pub fn high_water_mark(mut self, n: usize) -> Self {
        self.high_water_mark = n;
        self
    }

    /// Set the share of entries dropped per sweep (clamped to `(0, 1]`).
    pub fn evict_fraction(mut self, fraction: f64) -> Self {
        self.evict_fraction = fraction.clamp(f64::MIN_POSITIVE, 1.0);
        self
    }

    /// Set the content signature mode.
    pub fn signature(mut self, mode: SignatureMode) -> Self {
        self.signature = mode;
        self
    }

    /// Number of entries a sweep over `count` entries removes.
    pub fn evict_count(&self, count: usize) -> usize {
        // epsilon keeps exact multiples from rounding up an extra entry
        let n = (count as f64 * self.evict_fraction - 1e-9).ceil();
        (n.max(1.0) as usize).min(count)
    }
}

/// Serialized form of a cached result.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    payload: DomainResult,
    stored_at_ms: u64,
    /// Tie-breaker for entries stored within the same millisecond.
    seq: u64,
}

/// Store-backed cache of normalized results.
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    seq: AtomicU64,
}

impl ResponseCache {
    /// Create a cache over `store` using the system clock.
    pub fn new(config: CacheConfig, store: Arc<dyn KvStore>) -> Self {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit time source.
    pub fn with_clock(config: CacheConfig, store: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
            seq: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a cached result for a `mode` request.
    ///
    /// Returns `None` on miss, on expiry (deleting the entry) and on
    /// undecodable entries. Emits cache hit/miss metrics labelled by `mode`.
    pub async fn get(&self, mode: Mode, key: &CacheKey) -> Option<DomainResult> {
        let label = mode.as_str();
        let storage_key = key.storage_key();
        let raw = match self.store.get(&storage_key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "cache read failed, treating as miss");
                None
            }
        };

        let Some(raw) = raw else {
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "mode" => label).increment(1);
            return None;
        };

        let entry = match serde_json::from_str::<CacheEntry>(&raw) {
            Ok(entry) if entry.payload.mode() == mode => entry,
            Ok(_) => {
                warn!(key = %key, mode = label, "dropping cache entry stored for another mode");
                self.remove(storage_key).await;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "mode" => label).increment(1);
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "dropping undecodable cache entry");
                self.remove(storage_key).await;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "mode" => label).increment(1);
                return None;
            }
        };

        if self.is_expired(&entry) {
            debug!(key = %key, mode = label, "cache entry expired");
            self.remove(storage_key).await;
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "mode" => label).increment(1);
            return None;
        }

        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "mode" => label).increment(1);
        Some(entry.payload)
    }

    /// Store a result, sweeping old entries first if over the high-water mark.
    ///
    /// Degraded placeholders are never stored.
    pub async fn put(&self, key: &CacheKey, value: DomainResult) {
        if value.is_degraded() {
            debug!(key = %key, "not caching degraded result");
            return;
        }

        self.sweep_if_needed().await;

        let entry = CacheEntry {
            payload: value,
            stored_at_ms: self.clock.now_ms(),
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
        };
        let encoded = match serde_json::to_string(&entry) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache entry");
                return;
            }
        };
        if let Err(e) = self.store.set(&key.storage_key(), encoded).await {
            warn!(key = %key, error = %e, "cache write failed");
        }
    }

    /// Number of entries currently held (including not-yet-detected expired ones).
    pub async fn len(&self) -> usize {
        match self.store.keys(CACHE_PREFIX).await {
            Ok(keys) => keys.len(),
            Err(e) => {
                warn!(error = %e, "cache scan failed");
                0
            }
        }
    }

    /// Whether the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every cache entry.
    pub async fn clear(&self) {
        match self.store.keys(CACHE_PREFIX).await {
            Ok(keys) => self.remove_all(&keys).await,
            Err(e) => warn!(error = %e, "cache scan failed"),
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let age = self.clock.now_ms().saturating_sub(entry.stored_at_ms);
        age >= self.config.ttl.as_millis() as u64
    }

    async fn sweep_if_needed(&self) {
        let keys = match self.store.keys(CACHE_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "cache scan failed, skipping sweep");
                return;
            }
        };
        if keys.len() <= self.config.high_water_mark {
            return;
        }

        let evict = self.config.evict_count(keys.len());
        let mut aged = Vec::with_capacity(keys.len());
        for key in keys {
            // undecodable entries sort first and are swept before real ones
            let order = match self.store.get(&key).await {
                Ok(Some(raw)) => serde_json::from_str::<CacheEntry>(&raw)
                    .map(|e| (e.stored_at_ms, e.seq))
                    .unwrap_or((0, 0)),
                _ => (0, 0),
            };
            aged.push((order, key));
        }
        aged.sort();

        let victims: Vec<String> = aged.into_iter().take(evict).map(|(_, key)| key).collect();
        debug!(
            evicted = victims.len(),
            high_water_mark = self.config.high_water_mark,
            "sweeping response cache"
        );
        metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL).increment(victims.len() as u64);
        self.remove_all(&victims).await;
    }

    async fn remove(&self, storage_key: String) {
        self.remove_all(&[storage_key]).await;
    }

    async fn remove_all(&self, keys: &[String]) {
        if let Err(e) = self.store.remove_many(keys).await {
            warn!(error = %e, "cache removal failed");
        }
    }
}
