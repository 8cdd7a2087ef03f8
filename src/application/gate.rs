//! Admission gate (bulkhead) for the downstream store.
//!
//! A counting semaphore bounds how many callers may touch the shared store
//! at once, so a slow database cannot pile up unbounded worker threads.
//! Each named operation carries its own wait budget: the create path can
//! afford to wait a little, the resolve path cannot.
//!
//! Failing to get a permit is a normal outcome, not an error: the caller
//! checks `Permit::acquired` and reports overload upstream.

use crate::domain::error::ConfigError;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// The named operation classes competing for permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOperation {
    /// Encode/create path
    Shorten,
    /// Decode/resolve path (also used by the click flush)
    Resolve,
}

/// Configuration for the admission gate.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct GateConfig {
    /// Number of concurrent permits (store connections worth protecting).
    pub permits: usize,
    /// Maximum wait for a permit on the shorten path.
    pub shorten_wait: Duration,
    /// Maximum wait for a permit on the resolve path.
    pub resolve_wait: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            permits: 8,
            shorten_wait: Duration::from_millis(200),
            resolve_wait: Duration::from_millis(75),
        }
    }
}

#[derive(Debug)]
struct GateInner {
    available: Mutex<usize>,
    released: Condvar,
}

/// Counting semaphore with per-operation bounded waits and scoped permits.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
    shorten_wait: Duration,
    resolve_wait: Duration,
}

impl AdmissionGate {
    /// Build a gate from validated configuration.
    ///
    /// # Errors
    /// `ConfigError::ZeroPermits` if the permit count is zero.
    pub fn new(config: &GateConfig) -> Result<Self, ConfigError> {
        if config.permits == 0 {
            return Err(ConfigError::ZeroPermits);
        }
        Ok(Self {
            inner: Arc::new(GateInner {
                available: Mutex::new(config.permits),
                released: Condvar::new(),
            }),
            shorten_wait: config.shorten_wait,
            resolve_wait: config.resolve_wait,
        })
    }

    /// Try to acquire one permit, waiting up to the operation's budget.
    ///
    /// Always returns a [`Permit`]; check [`Permit::acquired`]. Timing out
    /// (or a poisoned lock from a panicking holder) yields an unacquired
    /// permit, never a panic or an error.
    pub fn try_acquire(&self, operation: GateOperation) -> Permit {
        let wait = match operation {
            GateOperation::Shorten => self.shorten_wait,
            GateOperation::Resolve => self.resolve_wait,
        };
        let deadline = Instant::now() + wait;

        let Ok(mut available) = self.inner.available.lock() else {
            return Permit { inner: None };
        };
        loop {
            if *available > 0 {
                *available -= 1;
                return Permit {
                    inner: Some(Arc::clone(&self.inner)),
                };
            }

            let now = Instant::now();
            if now >= deadline {
                return Permit { inner: None };
            }
            match self.inner.released.wait_timeout(available, deadline - now) {
                Ok((guard, _)) => available = guard,
                Err(_) => return Permit { inner: None },
            }
        }
    }

    /// Currently free permits. Primarily for observability and tests.
    pub fn available(&self) -> usize {
        self.inner
            .available
            .lock()
            .map(|guard| *guard)
            .unwrap_or(0)
    }
}

/// A scoped permit. Releases its semaphore slot exactly once on drop, and
/// only if it was actually acquired; dropping an unacquired permit is a
/// no-op. Double release is impossible by construction.
#[derive(Debug)]
#[must_use = "an unchecked permit silently bypasses the bulkhead"]
pub struct Permit {
    inner: Option<Arc<GateInner>>,
}

impl Permit {
    /// Whether a semaphore slot was actually obtained.
    pub fn acquired(&self) -> bool {
        self.inner.is_some()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            // Release even through a poisoned lock: the count must stay
            // accurate or the gate leaks capacity permanently.
            let mut available = match inner.available.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *available += 1;
            inner.released.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn gate(permits: usize, wait_ms: u64) -> AdmissionGate {
        AdmissionGate::new(&GateConfig {
            permits,
            shorten_wait: Duration::from_millis(wait_ms),
            resolve_wait: Duration::from_millis(wait_ms),
        })
        .unwrap()
    }

    #[test]
    fn test_zero_permits_rejected() {
        let result = AdmissionGate::new(&GateConfig {
            permits: 0,
            ..GateConfig::default()
        });
        assert!(matches!(result, Err(ConfigError::ZeroPermits)));
    }

    #[test]
    fn test_acquire_and_release() {
        let gate = gate(2, 10);
        assert_eq!(gate.available(), 2);

        let p1 = gate.try_acquire(GateOperation::Resolve);
        assert!(p1.acquired());
        assert_eq!(gate.available(), 1);

        let p2 = gate.try_acquire(GateOperation::Shorten);
        assert!(p2.acquired());
        assert_eq!(gate.available(), 0);

        drop(p1);
        assert_eq!(gate.available(), 1);
        drop(p2);
        assert_eq!(gate.available(), 2);
    }

    #[test]
    fn test_timeout_returns_unacquired() {
        let gate = gate(1, 20);
        let held = gate.try_acquire(GateOperation::Resolve);
        assert!(held.acquired());

        let denied = gate.try_acquire(GateOperation::Resolve);
        assert!(!denied.acquired());

        // Dropping an unacquired permit must not release anything.
        drop(denied);
        assert_eq!(gate.available(), 0);

        drop(held);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_zero_wait_is_immediate() {
        let gate = gate(1, 0);
        let held = gate.try_acquire(GateOperation::Resolve);
        assert!(held.acquired());
        let denied = gate.try_acquire(GateOperation::Resolve);
        assert!(!denied.acquired());
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let gate = gate(1, 2_000);
        let held = gate.try_acquire(GateOperation::Resolve);
        assert!(held.acquired());

        let gate_clone = gate.clone();
        let waiter = thread::spawn(move || {
            let permit = gate_clone.try_acquire(GateOperation::Resolve);
            permit.acquired()
        });

        // Give the waiter time to block, then free the slot.
        thread::sleep(Duration::from_millis(50));
        drop(held);

        assert!(waiter.join().unwrap(), "waiter should get the freed permit");
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_capacity_never_exceeded_under_contention() {
        const PERMITS: usize = 4;
        const THREADS: usize = 16;
        const ITERS: usize = 50;

        let gate = gate(PERMITS, 500);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..THREADS {
            let gate = gate.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(thread::spawn(move || {
                for _ in 0..ITERS {
                    let permit = gate.try_acquire(GateOperation::Resolve);
                    if permit.acquired() {
                        let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(current, Ordering::SeqCst);
                        thread::yield_now();
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(
            peak.load(Ordering::SeqCst) <= PERMITS,
            "held {} permits concurrently, capacity {}",
            peak.load(Ordering::SeqCst),
            PERMITS
        );
        assert_eq!(gate.available(), PERMITS, "all permits returned");
    }

    #[test]
    fn test_release_on_panic_path() {
        let gate = gate(1, 10);

        let gate_clone = gate.clone();
        let result = thread::spawn(move || {
            let _permit = gate_clone.try_acquire(GateOperation::Shorten);
            panic!("simulated failure while holding a permit");
        })
        .join();
        assert!(result.is_err());

        // The permit must have been released during unwind.
        assert_eq!(gate.available(), 1);
        assert!(gate.try_acquire(GateOperation::Shorten).acquired());
    }
}
