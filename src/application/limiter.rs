//! Fixed-window rate limiter for the create path.
//!
//! Creating a code costs a store write; a per-minute token budget keeps a
//! burst of create traffic from starving the resolve path. The window is
//! reset lazily inside the same critical section as the consumption check,
//! so concurrent callers racing a window boundary see one consistent reset.

use crate::application::ports::Clock;
use crate::domain::error::ConfigError;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fixed window length. One minute, per the public rate-limit contract.
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    window_start: Instant,
    tokens: u32,
}

/// Token counter reset every fixed window.
///
/// `try_consume` is a brief critical section and performs no I/O; it is safe
/// to call from any worker thread.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    capacity: u32,
    clock: Arc<dyn Clock>,
    state: Mutex<Window>,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `capacity` consumptions per minute.
    ///
    /// # Errors
    /// `ConfigError::ZeroCapacity` if `capacity` is zero.
    pub fn new(capacity: u32, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let now = clock.now();
        Ok(Self {
            capacity,
            clock,
            state: Mutex::new(Window {
                window_start: now,
                tokens: capacity,
            }),
        })
    }

    /// Consume one token if any remain in the current window.
    ///
    /// Resets the window first when at least a full window has elapsed since
    /// it started. Check and reset share one critical section.
    pub fn try_consume(&self) -> bool {
        let now = self.clock.now();
        let mut window = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if now.saturating_duration_since(window.window_start) >= WINDOW {
            window.window_start = now;
            window.tokens = self.capacity;
        }

        if window.tokens == 0 {
            return false;
        }
        window.tokens -= 1;
        true
    }

    /// Seconds until the current window ends, rounded up, never below 1.
    /// Suitable for a `Retry-After` hint.
    pub fn retry_after_secs(&self) -> u64 {
        let now = self.clock.now();
        let window = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let elapsed = now.saturating_duration_since(window.window_start);
        let remaining = WINDOW.saturating_sub(elapsed);
        (remaining.as_millis() as u64).div_ceil(1000).max(1)
    }
}
