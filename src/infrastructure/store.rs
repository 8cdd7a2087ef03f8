//! In-memory code store adapter.
//!
//! A DashMap-backed implementation of the `CodeStore` port. The production
//! store is a SQL database behind the same port, outside this crate; this
//! adapter serves tests, benches, and embedders that want the full pipeline
//! without a database.

use crate::application::ports::{CodeRecord, CodeStore, StoreError};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Thread-safe in-memory store with a built-in identifier sequence.
#[derive(Debug)]
pub struct InMemoryCodeStore {
    records: DashMap<u64, CodeRecord, ahash::RandomState>,
    counts: DashMap<u64, u64, ahash::RandomState>,
    next_id: AtomicU64,
}

impl InMemoryCodeStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::with_hasher(ahash::RandomState::new()),
            counts: DashMap::with_hasher(ahash::RandomState::new()),
            // Ids are strictly positive; the sequence starts at 1.
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a record under its own identifier.
    pub fn insert(&self, record: CodeRecord) {
        self.records.insert(record.id, record);
    }

    /// Allocate the next identifier and insert a record for it.
    pub fn allocate(&self, expires_at: Option<Instant>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.records.insert(id, CodeRecord { id, expires_at });
        id
    }

    /// Accumulated hit count for an identifier.
    pub fn count_of(&self, id: u64) -> u64 {
        self.counts.get(&id).map(|count| *count).unwrap_or(0)
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeStore for InMemoryCodeStore {
    fn find_by_id(&self, id: u64) -> Result<Option<CodeRecord>, StoreError> {
        Ok(self.records.get(&id).map(|record| *record))
    }

    fn increment_count(&self, id: u64, delta: u64) -> Result<u64, StoreError> {
        if !self.records.contains_key(&id) {
            // Mirrors an UPDATE touching zero rows.
            return Ok(0);
        }
        *self.counts.entry(id).or_insert(0) += delta;
        Ok(1)
    }
}
