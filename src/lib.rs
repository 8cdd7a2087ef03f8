//! # shortcode
//!
//! Reversible short-code encoding for numeric identifiers, plus the
//! resilience pieces that keep the backing store healthy under load:
//!
//! - **Codec**: a keyed, two-generation mapping between strictly positive
//!   64-bit identifiers and short base-62 codes. The legacy generation
//!   scrambles ids through a Feistel network and pads to a fixed minimum
//!   length; the compact generation uses an affine permutation mod 62^L to
//!   issue the shortest prefixed code that fits. Both round-trip exactly for
//!   the lifetime of a key.
//! - **Admission gate**: a counting semaphore with per-operation wait
//!   budgets, bounding concurrent access to the store.
//! - **Fixed-window limiter**: a per-minute token budget on the create path.
//! - **Click tracker**: batched, best-effort hit counting that never puts
//!   store I/O on the resolve path.
//!
//! ## Quick Start
//!
//! ```rust
//! use shortcode::{
//!     AdmissionGate, ClickTracker, CodecConfig, CompactConfig, FixedWindowLimiter,
//!     GateConfig, IdCodec, InMemoryCodeStore, ShortCodeService, SystemClock, TrackerConfig,
//! };
//! use std::sync::Arc;
//!
//! let store = Arc::new(InMemoryCodeStore::new());
//! let clock = Arc::new(SystemClock::new());
//! let gate = AdmissionGate::new(&GateConfig::default()).unwrap();
//!
//! let codec = IdCodec::new(&CodecConfig {
//!     key: "change-me-0123456789abcdef".to_string(),
//!     rounds: 5,
//!     min_length: 6,
//!     compact: CompactConfig::default(),
//! })
//! .unwrap();
//!
//! let limiter = FixedWindowLimiter::new(600, clock.clone()).unwrap();
//! let tracker = Arc::new(
//!     ClickTracker::new(&TrackerConfig::default(), store.clone(), gate.clone()).unwrap(),
//! );
//! let service = ShortCodeService::new(codec, gate, limiter, store.clone(), tracker, clock);
//!
//! let code = service.create_code(|| Ok(store.allocate(None))).unwrap();
//! let id = service.resolve_code(&code).unwrap();
//! assert_eq!(service.codec().encode(id).unwrap(), code);
//! ```
//!
//! ## Key rotation
//!
//! All keyed state (Feistel round keys, affine coefficients) is derived once
//! at construction and owned by the codec instance, so codecs under
//! different keys can coexist during a migration. Rotating the secret
//! invalidates all previously issued codes of that generation, an accepted
//! operational trade-off.
//!
//! ## Error taxonomy
//!
//! - [`CodeError`]: malformed or forged input; never retried. The service
//!   collapses every decode failure into [`ResolveError::NotFound`] so a
//!   probing client cannot distinguish failure modes.
//! - [`ConfigError`]: invalid startup configuration; construction fails and
//!   nothing is served.
//! - [`CreateError::RateLimited`] / [`ResolveError::Overloaded`]: retryable
//!   load shedding with a retry-after hint.
//! - [`StoreError`]: downstream store trouble; transient failures get a
//!   small jittered retry on lookups, and best-effort drop-and-log during
//!   click flushes.
//!
//! ## Background flushing
//!
//! With the `async` feature, [`ClickTracker::spawn_flush_task`] runs the
//! flush loop on a tokio interval. Without it, call
//! [`ClickTracker::flush`] from your own scheduler at
//! [`ClickTracker::flush_interval`].

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    base62,
    codec::{CodecConfig, CompactConfig, IdCodec},
    error::{CodeError, ConfigError},
    feistel::Feistel64,
};

pub use application::{
    gate::{AdmissionGate, GateConfig, GateOperation, Permit},
    limiter::FixedWindowLimiter,
    metrics::{ClickMetrics, ClickMetricsSnapshot},
    ports::{Clock, CodeRecord, CodeStore, StoreError},
    service::{CreateError, ResolveError, ShortCodeService},
    tracker::{ClickTracker, TrackerConfig},
};

pub use infrastructure::{clock::SystemClock, store::InMemoryCodeStore};

#[cfg(any(test, feature = "test-helpers"))]
pub use infrastructure::mocks::{FlakyStore, MockClock};
