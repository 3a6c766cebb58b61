//! # Exponential Backoff
//!
//! Per-key retry delays for the work queue. The delay doubles with every
//! consecutive failure of the same key, starting at `base` and capped at
//! `max`: with the defaults that is 5s, 10s, 20s, 40s, ... 5m.

use std::time::Duration;

/// Default first retry delay
pub const DEFAULT_BASE: Duration = Duration::from_secs(5);

/// Default delay ceiling
pub const DEFAULT_MAX: Duration = Duration::from_secs(300);

/// Exponential backoff calculator
///
/// Stateless: the caller tracks the failure count per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BASE, DEFAULT_MAX)
    }
}

impl ExponentialBackoff {
    /// Create a backoff with the given first delay and ceiling
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before the next attempt after `failures` consecutive failures
    ///
    /// `failures` is 1 for the first failure, which waits `base`. Zero
    /// failures means no delay.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
