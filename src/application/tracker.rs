//! Batched click aggregation.
//!
//! Every successful resolve records a hit. Writing each hit straight to the
//! store would put a write on the hottest read path, so hits accumulate in a
//! concurrent in-memory map of identifier → pending delta and a periodic
//! flush reconciles them with durable storage, best-effort. Analytics
//! accuracy is traded for resolve latency: under overload or store failure,
//! deltas are dropped and counted, never allowed to block a caller.
//!
//! The swap-then-drain flush is the standard lock-minimal technique: the
//! live map is atomically exchanged for a fresh one, so concurrent records
//! land wholly in the old map or wholly in the new one, so no increment is
//! lost or applied twice.

use crate::application::gate::{AdmissionGate, GateOperation};
use crate::application::metrics::ClickMetrics;
use crate::application::ports::CodeStore;
use crate::domain::error::ConfigError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

type PendingMap = DashMap<u64, AtomicU64, ahash::RandomState>;

fn fresh_map() -> Arc<PendingMap> {
    Arc::new(PendingMap::with_hasher(ahash::RandomState::new()))
}

/// Configuration for the click tracker.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct TrackerConfig {
    /// Master switch; a disabled tracker turns `record` into a no-op.
    pub enabled: bool,
    /// How often the background task flushes pending deltas.
    pub flush_interval: Duration,
    /// Soft cap on distinct pending identifiers. New identifiers past the
    /// cap are dropped (and counted) until a flush drains the buffer.
    pub max_pending: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval: Duration::from_secs(1),
            max_pending: 10_000,
        }
    }
}

impl TrackerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }
        if self.max_pending == 0 {
            return Err(ConfigError::ZeroMaxPending);
        }
        Ok(())
    }
}

/// Lock-minimal batched counter aggregator.
///
/// `record` contends only on the map shard for its identifier plus a shared
/// read lock that flush holds exclusively only for the O(1) buffer swap.
/// It never performs I/O. `flush` drains the swapped-out snapshot into the
/// store one identifier at a time, behind a resolve-class bulkhead permit.
pub struct ClickTracker<S> {
    enabled: bool,
    max_pending: usize,
    flush_interval: Duration,
    live: RwLock<Arc<PendingMap>>,
    store: Arc<S>,
    gate: AdmissionGate,
    metrics: ClickMetrics,
}

impl<S: CodeStore> ClickTracker<S> {
    /// Build a tracker over `store`, sharing the service's admission gate.
    ///
    /// # Errors
    /// `ConfigError` on a zero flush interval or pending cap.
    pub fn new(config: &TrackerConfig, store: Arc<S>, gate: AdmissionGate) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            enabled: config.enabled,
            max_pending: config.max_pending,
            flush_interval: config.flush_interval,
            live: RwLock::new(fresh_map()),
            store,
            gate,
            metrics: ClickMetrics::new(),
        })
    }

    /// Record one hit for `id`. Never blocks on I/O.
    ///
    /// Past the pending cap, hits for identifiers not already tracked are
    /// dropped and counted; identifiers already in the buffer keep
    /// accumulating so their eventual delta stays accurate.
    pub fn record(&self, id: u64) {
        if !self.enabled {
            return;
        }

        // Holding the read guard across the increment orders it before any
        // flush swap: an increment lands wholly in the map it started in.
        let Ok(live) = self.live.read() else {
            self.metrics.record_dropped(1);
            return;
        };

        // len() walks the shards, so the cap is approximate; that is fine,
        // it bounds growth rather than enforcing an exact size.
        if live.len() > self.max_pending && !live.contains_key(&id) {
            self.metrics.record_dropped(1);
            return;
        }

        match live.entry(id) {
            Entry::Occupied(entry) => {
                entry.get().fetch_add(1, Ordering::Relaxed);
            }
            Entry::Vacant(entry) => {
                entry.insert(AtomicU64::new(1));
            }
        }
        self.metrics.record_recorded();
    }

    /// Drain pending deltas into the store.
    ///
    /// Gated by a resolve-class permit: if none arrives within the budget,
    /// the whole cycle is skipped and retried at the next tick. A failure
    /// applying one identifier's delta drops that delta alone; the cycle
    /// continues with the rest.
    pub fn flush(&self) {
        if !self.enabled {
            return;
        }

        let permit = self.gate.try_acquire(GateOperation::Resolve);
        if !permit.acquired() {
            self.metrics.record_flush_skipped();
            tracing::debug!("click flush skipped: store bulkhead saturated");
            return;
        }

        let snapshot = {
            let mut live = match self.live.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            mem::replace(&mut *live, fresh_map())
        };

        let mut total: u64 = 0;
        for entry in snapshot.iter() {
            let id = *entry.key();
            // The write-lock swap happened after every record guard for this
            // map was released, so the value is final by the time we read it.
            let delta = entry.value().load(Ordering::Acquire);
            if delta == 0 {
                continue;
            }

            match self.store.increment_count(id, delta) {
                Ok(_) => {
                    total += delta;
                    self.metrics.record_flushed(delta);
                }
                Err(error) => {
                    self.metrics.record_dropped(delta);
                    tracing::warn!(id, delta, %error, "click flush failed, dropping delta");
                }
            }
        }

        if total > 0 {
            tracing::debug!(total, "flushed click deltas");
        }
    }

    /// Distinct identifiers currently pending. Approximate under concurrency.
    pub fn pending_len(&self) -> usize {
        self.live.read().map(|map| map.len()).unwrap_or(0)
    }

    /// Counter snapshot source for this tracker.
    pub fn metrics(&self) -> &ClickMetrics {
        &self.metrics
    }

    /// Configured flush cadence, for external schedulers.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

#[cfg(feature = "async")]
impl<S: CodeStore + 'static> ClickTracker<S> {
    /// Spawn a tokio task flushing at the configured interval.
    ///
    /// Ticks invoke `flush` sequentially within the task, so cycles never
    /// overlap; a tick that fires while a slow flush is still running is
    /// delayed, not stacked.
    pub fn spawn_flush_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tracker.flush();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::gate::GateConfig;
    use crate::infrastructure::mocks::FlakyStore;
    use crate::infrastructure::store::InMemoryCodeStore;
    use crate::application::ports::CodeRecord;
    use std::thread;

    fn gate() -> AdmissionGate {
        AdmissionGate::new(&GateConfig::default()).unwrap()
    }

    fn tracker_with(
        config: &TrackerConfig,
        store: Arc<InMemoryCodeStore>,
    ) -> ClickTracker<InMemoryCodeStore> {
        ClickTracker::new(config, store, gate()).unwrap()
    }

    fn store_with_ids(ids: &[u64]) -> Arc<InMemoryCodeStore> {
        let store = Arc::new(InMemoryCodeStore::new());
        for &id in ids {
            store.insert(CodeRecord::permanent(id));
        }
        store
    }

    #[test]
    fn test_config_validation() {
        let store = store_with_ids(&[]);
        let bad_interval = TrackerConfig {
            flush_interval: Duration::ZERO,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            ClickTracker::new(&bad_interval, store.clone(), gate()),
            Err(ConfigError::ZeroFlushInterval)
        ));

        let bad_cap = TrackerConfig {
            max_pending: 0,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            ClickTracker::new(&bad_cap, store, gate()),
            Err(ConfigError::ZeroMaxPending)
        ));
    }

    #[test]
    fn test_disabled_tracker_is_inert() {
        let store = store_with_ids(&[1]);
        let tracker = tracker_with(
            &TrackerConfig {
                enabled: false,
                ..TrackerConfig::default()
            },
            store.clone(),
        );

        for _ in 0..100 {
            tracker.record(1);
        }
        tracker.flush();

        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.metrics().recorded(), 0);
        assert_eq!(store.count_of(1), 0);
    }

    #[test]
    fn test_record_then_flush_applies_exact_deltas() {
        let store = store_with_ids(&[1, 2]);
        let tracker = tracker_with(&TrackerConfig::default(), store.clone());

        for _ in 0..5 {
            tracker.record(1);
        }
        for _ in 0..3 {
            tracker.record(2);
        }
        assert_eq!(tracker.pending_len(), 2);

        tracker.flush();

        assert_eq!(store.count_of(1), 5);
        assert_eq!(store.count_of(2), 3);
        assert_eq!(tracker.pending_len(), 0);
        assert_eq!(tracker.metrics().flushed(), 8);
        assert_eq!(tracker.metrics().dropped(), 0);
    }

    #[test]
    fn test_flush_with_empty_buffer_is_harmless() {
        let store = store_with_ids(&[]);
        let tracker = tracker_with(&TrackerConfig::default(), store);
        tracker.flush();
        tracker.flush();
        assert_eq!(tracker.metrics().flushed(), 0);
    }

    #[test]
    fn test_overflow_drops_only_new_identifiers() {
        let store = store_with_ids(&[1, 2, 3]);
        let tracker = tracker_with(
            &TrackerConfig {
                max_pending: 2,
                ..TrackerConfig::default()
            },
            store.clone(),
        );

        // Fill past the cap: ids 1..=3 tracked, len() now exceeds 2.
        tracker.record(1);
        tracker.record(2);
        tracker.record(3);

        // New identifier: dropped.
        tracker.record(99);
        assert_eq!(tracker.metrics().dropped(), 1);
        assert_eq!(tracker.pending_len(), 3);

        // Existing identifier: still accumulates.
        tracker.record(1);
        tracker.flush();

        assert_eq!(store.count_of(1), 2);
        assert_eq!(store.count_of(2), 1);
        assert_eq!(store.count_of(3), 1);
        assert_eq!(store.count_of(99), 0);
    }

    #[test]
    fn test_failed_delta_does_not_abort_flush() {
        // Only id 2 exists; incrementing id 1 fails permanently.
        let inner = store_with_ids(&[2]);
        let failing = Arc::new(FlakyStore::new(inner.clone()));
        failing.fail_increments_for(1);
        let tracker = ClickTracker::new(&TrackerConfig::default(), failing, gate()).unwrap();

        tracker.record(1);
        tracker.record(1);
        tracker.record(2);
        tracker.flush();

        // Id 1's delta is dropped, id 2's still lands.
        assert_eq!(inner.count_of(2), 1);
        assert_eq!(tracker.metrics().flushed(), 1);
        assert_eq!(tracker.metrics().dropped(), 2);
    }

    #[test]
    fn test_flush_skipped_when_gate_saturated() {
        let store = store_with_ids(&[1]);
        let starved_gate = AdmissionGate::new(&GateConfig {
            permits: 1,
            shorten_wait: Duration::from_millis(5),
            resolve_wait: Duration::from_millis(5),
        })
        .unwrap();
        let tracker =
            ClickTracker::new(&TrackerConfig::default(), store.clone(), starved_gate.clone())
                .unwrap();

        tracker.record(1);

        let held = starved_gate.try_acquire(GateOperation::Resolve);
        assert!(held.acquired());
        tracker.flush();
        drop(held);

        // Nothing applied, nothing lost: the delta is still pending.
        assert_eq!(store.count_of(1), 0);
        assert_eq!(tracker.metrics().flushes_skipped(), 1);
        assert_eq!(tracker.pending_len(), 1);

        tracker.flush();
        assert_eq!(store.count_of(1), 1);
    }

    #[test]
    fn test_conservation_under_concurrent_record_and_flush() {
        const THREADS: u64 = 8;
        const PER_THREAD: u64 = 2_000;
        const IDS: u64 = 16;

        let store = store_with_ids(&(1..=IDS).collect::<Vec<_>>());
        let tracker = Arc::new(tracker_with(
            &TrackerConfig {
                max_pending: 1_000_000,
                ..TrackerConfig::default()
            },
            store.clone(),
        ));

        let mut handles = vec![];
        for t in 0..THREADS {
            let tracker = Arc::clone(&tracker);
            handles.push(thread::spawn(move || {
                for i in 0..PER_THREAD {
                    tracker.record(1 + (t * PER_THREAD + i) % IDS);
                }
            }));
        }

        // Flush aggressively while recorders run.
        let flusher = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for _ in 0..50 {
                    tracker.flush();
                    thread::yield_now();
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        flusher.join().unwrap();

        // Final drain.
        tracker.flush();

        let total: u64 = (1..=IDS).map(|id| store.count_of(id)).sum();
        assert_eq!(total, THREADS * PER_THREAD, "no click lost or duplicated");
        assert_eq!(tracker.metrics().dropped(), 0);
        assert_eq!(tracker.metrics().flushed(), THREADS * PER_THREAD);
    }

    #[cfg(feature = "async")]
    #[tokio::test]
    async fn test_background_flush_task() {
        let store = store_with_ids(&[7]);
        let tracker = Arc::new(
            ClickTracker::new(
                &TrackerConfig {
                    flush_interval: Duration::from_millis(20),
                    ..TrackerConfig::default()
                },
                store.clone(),
                gate(),
            )
            .unwrap(),
        );

        for _ in 0..4 {
            tracker.record(7);
        }
        let handle = tracker.spawn_flush_task();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.count_of(7), 4);
    }
}
