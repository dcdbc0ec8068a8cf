//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions by reason.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::entry::EvictionReason;

// == Stats Counters ==
/// Lock-free counters updated by cache operations.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    removed: AtomicU64,
    replaced: AtomicU64,
    expired: AtomicU64,
    token_expired: AtomicU64,
    capacity: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, reason: EvictionReason) {
        let counter = match reason {
            EvictionReason::Removed => &self.removed,
            EvictionReason::Replaced => &self.replaced,
            EvictionReason::Expired => &self.expired,
            EvictionReason::TokenExpired => &self.token_expired,
            EvictionReason::Capacity => &self.capacity,
            EvictionReason::None => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, total_entries: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            token_expired: self.token_expired.load(Ordering::Relaxed),
            capacity: self.capacity.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

// == Cache Stats ==
/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    pub removed: u64,
    pub replaced: u64,
    pub expired: u64,
    pub token_expired: u64,
    /// Evictions made by compaction
    pub capacity: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
}

impl CacheStats {
    // == Evictions ==
    /// Total evictions across all reasons.
    pub fn evictions(&self) -> u64 {
        self.removed + self.replaced + self.expired + self.token_expired + self.capacity
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
