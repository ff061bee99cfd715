//! Per-process cache of query results.
//!
//! Entries are keyed by operation, normalized parameters, the available
//! partitions and the requested day range. Only outcomes that would repeat on
//! the next attempt are stored (see [`QueryResult::is_cacheable`]). Entries
//! live until invalidated, cleared, or (when configured) their TTL elapses.

use crate::config::CacheSettings;
use crate::partition::{PartitionKey, PartitionUri};
use crate::query::{Operation, Params, QueryResult};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Identity of a query for caching purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub operation: Operation,
    pub params: Params,
    /// Available partitions only, in order
    pub partitions: Vec<(PartitionKey, PartitionUri)>,
    pub range: (NaiveDate, NaiveDate),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: QueryResult,
    created_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.created_at.elapsed() >= ttl)
    }
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

pub struct ResultCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    enabled: bool,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl ResultCache {
    pub fn new(settings: &CacheSettings) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            enabled: settings.enabled,
            ttl: settings.ttl(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a stored result, dropping it if expired
    pub fn get(&self, key: &CacheKey) -> Option<QueryResult> {
        if !self.enabled {
            return None;
        }
        let found = {
            let entries = self.entries.read();
            entries.get(key).map(|entry| (entry.is_expired(self.ttl), entry.result.clone()))
        };
        match found {
            Some((false, result)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            Some((true, _)) => {
                self.evict_expired(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Remove the entry for `key` only if it is still expired under the
    /// write lock; a fresh insert that raced the lookup is kept.
    fn evict_expired(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(self.ttl)) {
            entries.remove(key);
            return true;
        }
        false
    }

    /// Store `result` if it is cacheable. Returns whether it was stored.
    pub fn insert(&self, key: CacheKey, result: QueryResult) -> bool {
        if !self.enabled || !result.is_cacheable() {
            return false;
        }
        self.entries.write().insert(
            key,
            CacheEntry {
                result,
                created_at: Instant::now(),
            },
        );
        self.inserts.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Return the stored result for `key`, or run `compute` and store what
    /// it returns when cacheable.
    ///
    /// No lock is held while `compute` runs; concurrent misses on the same
    /// key may each compute, and the last one stored wins.
    #[instrument(skip_all, fields(operation = %key.operation, partitions = key.partitions.len()))]
    pub async fn get_or_compute<F, Fut>(&self, key: &CacheKey, compute: F) -> QueryResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = QueryResult>,
    {
        if let Some(result) = self.get(key) {
            debug!("Cache hit");
            return result;
        }
        debug!("Cache miss");
        let result = compute().await;
        if self.insert(key.clone(), result.clone()) {
            debug!("Cached result");
        }
        result
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}
