//! Exponential reconnection policy.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Tracks reconnection attempts and computes backoff delays.
///
/// The delay of attempt `n` (0-indexed) is `base_delay * 2^n`. Only the
/// attempt count is capped; the delay itself is not. A computation that
/// overflows saturates to [`Duration::MAX`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    attempt_count: u32,
    max_attempts: u32,
    base_delay: Duration,
}

impl ReconnectPolicy {
    /// Creates a policy with no attempts made yet.
    #[inline]
    #[must_use]
    pub const fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts,
            base_delay,
        }
    }

    /// Delay before attempt `attempt` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }

    /// Claims the next attempt.
    ///
    /// Returns the attempt index and its delay, or `None` once
    /// `attempt_count >= max_attempts`.
    pub fn next_attempt(&mut self) -> Option<(u32, Duration)> {
        if self.is_exhausted() {
            return None;
        }
        let attempt = self.attempt_count;
        self.attempt_count += 1;
        Some((attempt, self.delay_for(attempt)))
    }

    /// Resets the attempt count (called on every successful connection).
    #[inline]
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of attempts claimed since the last reset.
    #[inline]
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt_count
    }

    /// Configured maximum.
    #[inline]
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` once no further automatic attempt is allowed.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

// ============================================================================
// Tests
// ============================================================================
