//! Backoff between retry attempts.
//!
//! Attempt semantics: attempt index `0` is the initial call (no delay). `delay(n)` for `n >= 1`
//! is the wait after the n-th attempt failed, i.e. before attempt `n + 1`:
//!
//! ```text
//! delay(n) = min(initial * multiplier^(n-1), max)
//! ```
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use analysis_relay::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(1000))
//!     .with_max(Duration::from_secs(30))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO); // initial call
//! assert_eq!(backoff.delay(1), Duration::from_millis(1000));
//! assert_eq!(backoff.delay(2), Duration::from_millis(2000));
//! assert_eq!(backoff.delay(9), Duration::from_secs(30)); // capped
//! ```
//!
//! Computations that overflow saturate to [`MAX_BACKOFF`] (1 day).

use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackoffError {
    #[error("multiplier must be a finite number >= 1.0 (got {0})")]
    InvalidMultiplier(f64),
    #[error("max must be greater than zero")]
    MaxMustBePositive,
    #[error("max ({max:?}) must be >= initial ({initial:?})")]
    MaxLessThanInitial { initial: Duration, max: Duration },
}

/// Exponential backoff with a configurable multiplier and cap.
///
/// A multiplier of `1.0` degenerates into a constant delay.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
}

impl Backoff {
    /// Doubling backoff starting at `initial`, capped only by [`MAX_BACKOFF`].
    pub fn exponential(initial: Duration) -> Self {
        Self { initial, multiplier: 2.0, max: MAX_BACKOFF }
    }

    /// Same delay before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { initial: delay, multiplier: 1.0, max: MAX_BACKOFF }
    }

    /// Set the growth factor applied after every failed attempt.
    pub fn with_multiplier(mut self, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        self.multiplier = multiplier;
        Ok(self)
    }

    /// Cap every delay at `max`. Rejects zero and anything below the initial delay.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        if max.is_zero() {
            return Err(BackoffError::MaxMustBePositive);
        }
        if max < self.initial {
            return Err(BackoffError::MaxLessThanInitial { initial: self.initial, max });
        }
        self.max = max.min(MAX_BACKOFF);
        Ok(self)
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay after the given (1-based) failed attempt; `0` yields no delay.
    pub fn delay(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as usize) as i32;
        let factor = self.multiplier.powi(exponent);
        let nanos = self.initial.as_nanos() as f64 * factor;
        let cap = self.max.as_nanos() as f64;
        if !nanos.is_finite() || nanos >= cap {
            return self.max;
        }
        // f64 arithmetic can land a hair below an exact millisecond; round to whole nanos
        Duration::from_nanos(nanos.round() as u64).min(self.max)
    }
}
