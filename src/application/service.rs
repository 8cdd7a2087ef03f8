//! Public service surface: create, resolve, record.
//!
//! This is the seam the (out-of-scope) HTTP layer calls into. It wires the
//! codec to the resilience pieces: the rate limiter guards creates, the
//! bulkhead guards every store touch, transient store failures get a small
//! jittered retry, and every decode failure collapses into "not found" so a
//! probing client learns nothing about the encoding scheme.

use crate::application::gate::{AdmissionGate, GateOperation};
use crate::application::limiter::FixedWindowLimiter;
use crate::application::ports::{Clock, CodeStore, StoreError};
use crate::application::tracker::ClickTracker;
use crate::domain::codec::IdCodec;
use crate::domain::error::CodeError;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a create failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateError {
    /// The per-minute create budget is exhausted.
    RateLimited { retry_after_secs: u64 },
    /// No bulkhead permit arrived within the shorten budget.
    Overloaded { retry_after_secs: u64 },
    /// The identifier allocator failed after retries.
    Store(StoreError),
    /// The allocated identifier could not be encoded (allocator bug).
    Codec(CodeError),
}

impl fmt::Display for CreateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreateError::RateLimited { retry_after_secs } => {
                write!(f, "rate limit exceeded, retry in {}s", retry_after_secs)
            }
            CreateError::Overloaded { retry_after_secs } => {
                write!(f, "system busy, retry in {}s", retry_after_secs)
            }
            CreateError::Store(e) => write!(f, "create failed: {}", e),
            CreateError::Codec(e) => write!(f, "create failed: {}", e),
        }
    }
}

impl std::error::Error for CreateError {}

/// Why a resolve failed.
///
/// Malformed, forged, and unmapped codes are deliberately indistinguishable:
/// all surface as `NotFound`. Overload and expiry are distinguishable so
/// clients can back off or stop retrying respectively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Unknown, malformed, or forged code.
    NotFound,
    /// The code exists but its record has expired.
    Expired,
    /// No bulkhead permit arrived within the resolve budget.
    Overloaded { retry_after_secs: u64 },
    /// The store kept failing after retries.
    Store(StoreError),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound => write!(f, "code not found"),
            ResolveError::Expired => write!(f, "code expired"),
            ResolveError::Overloaded { retry_after_secs } => {
                write!(f, "service overloaded, retry in {}s", retry_after_secs)
            }
            ResolveError::Store(e) => write!(f, "resolve failed: {}", e),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Retry schedule for transient store failures: exponential backoff with
/// full jitter on each delay, capped.
#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: u32,
    max_delay: Duration,
}

/// Create path: the original row insert is worth three attempts.
const CREATE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: Duration::from_millis(50),
    multiplier: 3,
    max_delay: Duration::from_millis(400),
};

/// Resolve path: latency-sensitive, one quick re-try only.
const RESOLVE_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 2,
    base_delay: Duration::from_millis(50),
    multiplier: 2,
    max_delay: Duration::from_millis(150),
};

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self
            .base_delay
            .saturating_mul(self.multiplier.saturating_pow(attempt))
            .min(self.max_delay);
        // Full jitter over the upper half keeps retries spread out without
        // ever firing immediately.
        let millis = scaled.as_millis() as u64;
        let jittered = millis / 2 + rand::rng().random_range(0..=millis / 2);
        Duration::from_millis(jittered)
    }
}

fn retry_transient<T, F>(policy: RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Result<T, StoreError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(attempt, ?delay, %error, "transient store failure, retrying");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// The core service: codec plus resilience around a durable store.
pub struct ShortCodeService<S> {
    codec: IdCodec,
    gate: AdmissionGate,
    limiter: FixedWindowLimiter,
    store: Arc<S>,
    tracker: Arc<ClickTracker<S>>,
    clock: Arc<dyn Clock>,
}

impl<S: CodeStore> ShortCodeService<S> {
    pub fn new(
        codec: IdCodec,
        gate: AdmissionGate,
        limiter: FixedWindowLimiter,
        store: Arc<S>,
        tracker: Arc<ClickTracker<S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            codec,
            gate,
            limiter,
            store,
            tracker,
            clock,
        }
    }

    /// Allocate an identifier and return its public code.
    ///
    /// Gated by the rate limiter first (cheap rejection), then by a
    /// shorten-class bulkhead permit held across the allocation. `allocate`
    /// stands in for the store's row insert / sequence: it is retried on
    /// transient failure, so it must be idempotent-safe under retry.
    pub fn create_code<F>(&self, allocate: F) -> Result<String, CreateError>
    where
        F: FnMut() -> Result<u64, StoreError>,
    {
        if !self.limiter.try_consume() {
            return Err(CreateError::RateLimited {
                retry_after_secs: self.limiter.retry_after_secs(),
            });
        }

        let permit = self.gate.try_acquire(GateOperation::Shorten);
        if !permit.acquired() {
            return Err(CreateError::Overloaded {
                retry_after_secs: 1,
            });
        }

        let id = retry_transient(CREATE_RETRY, allocate).map_err(CreateError::Store)?;
        self.codec.encode(id).map_err(CreateError::Codec)
    }

    /// Resolve a public code to its identifier.
    ///
    /// On success a hit is recorded into the click tracker, fire-and-forget;
    /// recording can never fail the resolve or add I/O latency to it.
    pub fn resolve_code(&self, code: &str) -> Result<u64, ResolveError> {
        // Collapse every decode failure: forged and unknown codes must be
        // indistinguishable to the caller.
        let id = self.codec.decode(code).map_err(|_| ResolveError::NotFound)?;

        let record = {
            let permit = self.gate.try_acquire(GateOperation::Resolve);
            if !permit.acquired() {
                return Err(ResolveError::Overloaded {
                    retry_after_secs: 1,
                });
            }
            retry_transient(RESOLVE_RETRY, || self.store.find_by_id(id))
                .map_err(ResolveError::Store)?
                .ok_or(ResolveError::NotFound)?
        };

        if record.is_expired(self.clock.now()) {
            return Err(ResolveError::Expired);
        }

        self.tracker.record(id);
        Ok(id)
    }

    /// Record a hit without resolving. Fire-and-forget.
    pub fn record_hit(&self, id: u64) {
        self.tracker.record(id);
    }

    /// The click tracker, e.g. for wiring up a flush schedule.
    pub fn tracker(&self) -> &Arc<ClickTracker<S>> {
        &self.tracker
    }

    /// The codec, for callers that only need encoding.
    pub fn codec(&self) -> &IdCodec {
        &self.codec
    }
}
