//! Fault-injecting store wrapper for testing.

use crate::application::ports::{CodeRecord, CodeStore, StoreError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Wraps a [`CodeStore`] and injects failures on demand.
///
/// Transient failure budgets (`fail_finds`, `fail_increments`) make the next
/// N calls return `StoreError::Unavailable`, then pass through again, for
/// exercising retry paths. `fail_increments_for` marks an identifier whose
/// increments always fail permanently, for exercising best-effort flush.
#[derive(Debug)]
pub struct FlakyStore<S> {
    inner: Arc<S>,
    failing_finds: AtomicU32,
    failing_increments: AtomicU32,
    poisoned_ids: Mutex<HashSet<u64>>,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self {
            inner,
            failing_finds: AtomicU32::new(0),
            failing_increments: AtomicU32::new(0),
            poisoned_ids: Mutex::new(HashSet::new()),
        }
    }

    /// Fail the next `n` `find_by_id` calls transiently.
    pub fn fail_finds(&self, n: u32) {
        self.failing_finds.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` `increment_count` calls transiently.
    pub fn fail_increments(&self, n: u32) {
        self.failing_increments.store(n, Ordering::SeqCst);
    }

    /// Permanently fail every `increment_count` for `id`.
    pub fn fail_increments_for(&self, id: u64) {
        self.poisoned_ids
            .lock()
            .expect("FlakyStore mutex poisoned - a test thread panicked while holding the lock")
            .insert(id);
    }

    fn take_budgeted_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl<S: CodeStore> CodeStore for FlakyStore<S> {
    fn find_by_id(&self, id: u64) -> Result<Option<CodeRecord>, StoreError> {
        if Self::take_budgeted_failure(&self.failing_finds) {
            return Err(StoreError::Unavailable("injected find failure".into()));
        }
        self.inner.find_by_id(id)
    }

    fn increment_count(&self, id: u64, delta: u64) -> Result<u64, StoreError> {
        if self
            .poisoned_ids
            .lock()
            .expect("FlakyStore mutex poisoned - a test thread panicked while holding the lock")
            .contains(&id)
        {
            return Err(StoreError::Failed("injected permanent failure".into()));
        }
        if Self::take_budgeted_failure(&self.failing_increments) {
            return Err(StoreError::Unavailable("injected increment failure".into()));
        }
        self.inner.increment_count(id, delta)
    }
}
