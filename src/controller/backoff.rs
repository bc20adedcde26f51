//! # Fibonacci Backoff
//!
//! Provides a Fibonacci-based backoff for retries. The sequence grows more
//! slowly than exponential backoff, which suits operations that may need many
//! attempts (artifact downloads, failed reconciliations) without hammering the
//! remote side.
//!
//! The unit is chosen by the caller: reconciliation errors use minutes
//! (1m, 1m, 2m, 3m, 5m, 8m, 10m), artifact downloads use seconds.
//!
//! ## Usage
//!
//! ```rust
//! use gitopssets_controller::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::from_minutes(1, 10);
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
//! ```

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Minimum backoff (first two values, and the value after reset)
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min` and `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let max = max.max(min);
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Backoff measured in minutes, as used for reconciliation errors
    #[must_use]
    pub fn from_minutes(min_minutes: u64, max_minutes: u64) -> Self {
        Self::new(
            Duration::from_secs(min_minutes * 60),
            Duration::from_secs(max_minutes * 60),
        )
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);

        result
    }

    /// Get the next backoff duration in whole seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        self.next_backoff().as_secs()
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}
