//! Observability counters for click aggregation.
//!
//! All counters use relaxed atomic operations; they are the audit trail for
//! the tracker's conservation invariant (every recorded delta is eventually
//! flushed, still pending, or counted as dropped, never silently lost).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters tracking the click pipeline. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct ClickMetrics {
    inner: Arc<ClickMetricsInner>,
}

#[derive(Debug)]
struct ClickMetricsInner {
    /// Clicks accepted into the pending buffer
    recorded: AtomicU64,
    /// Clicks dropped: buffer overflow rejections plus failed-flush deltas
    dropped: AtomicU64,
    /// Deltas successfully applied to the durable store
    flushed: AtomicU64,
    /// Flush cycles skipped because no bulkhead permit was available
    flushes_skipped: AtomicU64,
}

impl ClickMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClickMetricsInner {
                recorded: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                flushed: AtomicU64::new(0),
                flushes_skipped: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn record_recorded(&self) {
        self.inner.recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, delta: u64) {
        self.inner.dropped.fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn record_flushed(&self, delta: u64) {
        self.inner.flushed.fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_skipped(&self) {
        self.inner.flushes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Clicks accepted into the pending buffer.
    pub fn recorded(&self) -> u64 {
        self.inner.recorded.load(Ordering::Relaxed)
    }

    /// Clicks dropped, either rejected at record time or lost to a failed
    /// flush.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Deltas applied to the durable store.
    pub fn flushed(&self) -> u64 {
        self.inner.flushed.load(Ordering::Relaxed)
    }

    /// Flush cycles skipped for lack of a permit.
    pub fn flushes_skipped(&self) -> u64 {
        self.inner.flushes_skipped.load(Ordering::Relaxed)
    }

    /// Point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> ClickMetricsSnapshot {
        ClickMetricsSnapshot {
            recorded: self.recorded(),
            dropped: self.dropped(),
            flushed: self.flushed(),
            flushes_skipped: self.flushes_skipped(),
        }
    }
}

impl Default for ClickMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of click metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClickMetricsSnapshot {
    pub recorded: u64,
    pub dropped: u64,
    pub flushed: u64,
    pub flushes_skipped: u64,
}
