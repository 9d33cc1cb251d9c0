//! Atomic stats counters
//!
//! `Counter` is a mark/reset gauge: `mark` adds, `reset` takes the count
//! since the previous reset and remembers it as `last`. The periodic status
//! line and the stats snapshot both read from these.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// A lock-free mark/reset counter
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicU64,
    last: AtomicU64,
}

impl Counter {
    /// Create a counter at zero
    pub const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            last: AtomicU64::new(0),
        }
    }

    /// Add one
    #[inline]
    pub fn mark(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n`
    #[inline]
    pub fn mark_n(&self, n: u64) {
        self.count.fetch_add(n, Ordering::Relaxed);
    }

    /// Take the count since the previous reset, remembering it as `last`
    pub fn reset(&self) -> u64 {
        let count = self.count.swap(0, Ordering::Relaxed);
        self.last.store(count, Ordering::Relaxed);
        count
    }

    /// The value the previous `reset` returned
    #[inline]
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }

    /// Current un-reset count
    #[inline]
    pub fn current(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/// Point-in-time snapshot of archiver gauges
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ArchiverStats {
    /// Live republish subscribers
    pub num_repub_clients: usize,
    /// Readings ingested in the last status interval
    pub incoming_counter: u64,
    /// TSDB write batches queued in the last status interval
    pub pending_writes: u64,
    /// Live pooled TSDB connections
    pub tsdb_connections: usize,
}

#[cfg(test)]
#[path = "stats_test.rs"]
mod tests;
