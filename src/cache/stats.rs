//! Cache Statistics Module
//!
//! Tracks cache activity: hits, misses, loader invocations and removals by
//! cause.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::cache::RemovalCause;

// == Cache Stats ==
/// Point-in-time snapshot of cache activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of reads that found a live entry
    pub hits: u64,
    /// Number of reads that found nothing (absent, expired or collected)
    pub misses: u64,
    /// Number of loader invocations by `compute` and friends
    pub loads: u64,
    /// Notifications delivered by the reaper, by cause
    pub removals: RemovalCounts,
    /// Current number of mapped entries
    pub total_entries: usize,
}

/// Removal counts per cause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalCounts {
    pub explicit: u64,
    pub replaced: u64,
    pub collected: u64,
    pub expired: u64,
    pub size: u64,
}

impl RemovalCounts {
    /// Total removals across all causes.
    pub fn total(&self) -> u64 {
        self.explicit + self.replaced + self.collected + self.expired + self.size
    }
}

impl CacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Counter ==
/// Lock-free counters shared by all threads using a cache.
#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    removals: [AtomicU64; 5],
}

impl StatsCounter {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a read as a hit or a miss.
    pub(crate) fn record_read(&self, found: bool) {
        if found {
            self.record_hit();
        } else {
            self.record_miss();
        }
    }

    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removal(&self, cause: RemovalCause) {
        self.removals[slot(cause)].fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, total_entries: usize) -> CacheStats {
        let removal = |cause| self.removals[slot(cause)].load(Ordering::Relaxed);

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            removals: RemovalCounts {
                explicit: removal(RemovalCause::Explicit),
                replaced: removal(RemovalCause::Replaced),
                collected: removal(RemovalCause::Collected),
                expired: removal(RemovalCause::Expired),
                size: removal(RemovalCause::Size),
            },
            total_entries,
        }
    }
}

fn slot(cause: RemovalCause) -> usize {
    match cause {
        RemovalCause::Explicit => 0,
        RemovalCause::Replaced => 1,
        RemovalCause::Collected => 2,
        RemovalCause::Expired => 3,
        RemovalCause::Size => 4,
    }
}
