//! Reader counters
//!
//! Lock-free counters updated from every decode worker. Relaxed ordering is
//! enough: the values are only ever reported, never used for control flow.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct ReaderMetrics {
    /// Events handed to the reader
    pub events: AtomicU64,
    /// Board data banks decoded
    pub boards: AtomicU64,
    /// Frames extracted from board buffers
    pub frames: AtomicU64,
    /// Sample records emitted
    pub samples: AtomicU64,
    /// Data multisamples diverted to the unresolved side channel
    pub unresolved: AtomicU64,
    /// Events with at least one header or assembly failure
    pub header_failures: AtomicU64,
    /// Events rejected under the fail-closed policy
    pub rejected: AtomicU64,
}

impl ReaderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_events(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_boards(&self) {
        self.boards.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_frames(&self, n: u64) {
        self.frames.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_samples(&self, n: u64) {
        self.samples.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_unresolved(&self, n: u64) {
        self.unresolved.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_header_failures(&self) {
        self.header_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            boards: self.boards.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            header_failures: self.header_failures.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of counter values at a point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub events: u64,
    pub boards: u64,
    pub frames: u64,
    pub samples: u64,
    pub unresolved: u64,
    pub header_failures: u64,
    pub rejected: u64,
}

impl MetricsSnapshot {
    /// Fraction of events whose headers validated cleanly
    pub fn good_fraction(&self) -> f64 {
        if self.events == 0 {
            return 1.0;
        }
        1.0 - self.header_failures as f64 / self.events as f64
    }
}
