//! TTL response store.
//!
//! Maps a request fingerprint to the JSON body it produced. Expiry is lazy:
//! a stale entry is simply not returned. `purge_expired` and the optional
//! sweeper only reclaim memory.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use metrics::{counter, gauge};
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::keys::CacheKey;

const METRIC_CACHE_HIT: &str = "embodied_cache_hit_total";
const METRIC_CACHE_MISS: &str = "embodied_cache_miss_total";
const METRIC_CACHE_ENTRIES: &str = "embodied_cache_entries";

/// A cached response body.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// An entry is readable iff `now - stored_at < ttl`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < self.ttl
    }
}

/// Observability snapshot surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
}

/// Concurrent TTL store shared by every client of one service.
///
/// Each key lives in one shard of the map, so a write to a key is atomic with
/// respect to readers of that key. Writers race per key; the last one wins.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored value if it is still fresh.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| entry.value.clone());

        if value.is_some() {
            counter!(METRIC_CACHE_HIT).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS).increment(1);
        }
        value
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn put(&self, key: CacheKey, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.insert(key, entry);
        gauge!(METRIC_CACHE_ENTRIES).set(self.entries.len() as f64);
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        gauge!(METRIC_CACHE_ENTRIES).set(0.0);
        info!(dropped, "Cache cleared");
    }

    /// Number of stored entries, fresh or not.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats { size: self.size() }
    }

    /// Remove expired entries, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh_at(now));
        let after = self.entries.len();
        gauge!(METRIC_CACHE_ENTRIES).set(after as f64);
        before.saturating_sub(after)
    }

    /// Spawn a task that purges expired entries every `every`.
    ///
    /// The task runs until the returned handle is aborted or the runtime stops.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = store.purge_expired();
                if removed > 0 {
                    debug!(removed, "Swept expired cache entries");
                }
            }
        })
    }
}
