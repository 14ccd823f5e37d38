//! Retry policy for asset fetches

use crate::LoadError;

/// Decides whether a failed fetch is attempted again
///
/// Only retryable errors (see [`LoadError::is_retryable`]) are repeated, and
/// never more than `max_attempts` times in total. A cancelled load is never
/// retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    /// Create a policy allowing up to `max_attempts` attempts in total
    ///
    /// Values below 1 are clamped to a single attempt.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// A policy that never retries
    pub fn never() -> Self {
        Self::new(1)
    }

    /// Total number of attempts allowed, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true if another attempt should follow `attempts_made` failed ones
    pub fn should_retry(&self, attempts_made: u32, error: &LoadError) -> bool {
        error.is_retryable() && attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
