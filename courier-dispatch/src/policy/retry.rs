//! Retry policy for provider attempts.
//!
//! Each provider gets a fixed number of attempts. After every failed attempt
//! the dispatcher waits before continuing, starting at the initial backoff and
//! multiplying it after each wait. With the defaults a provider that always
//! fails sees waits of 500ms, 1000ms and 2000ms.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy configuration for a single provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per provider before switching to the next one.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Wait after the first failed attempt (in milliseconds).
    ///
    /// Default: 500
    #[serde(default = "defaults::initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Factor applied to the wait after each failure.
    ///
    /// Default: 2
    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            initial_backoff_ms: defaults::initial_backoff_ms(),
            backoff_multiplier: defaults::backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while another attempt is allowed on the current provider.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// Wait after the failure of the 0-indexed `attempt`.
    ///
    /// Saturates rather than overflowing for absurd attempt counts.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier)
            .checked_pow(attempt)
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn initial_backoff_ms() -> u64 {
        500
    }

    pub const fn backoff_multiplier() -> u32 {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff_ms, 500);
        assert_eq!(policy.backoff_multiplier, 2);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::new();

        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(10));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new();
        let waits: Vec<_> = (0..policy.max_attempts)
            .map(|attempt| policy.backoff(attempt))
            .collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(500),
                Duration::from_millis(1_000),
                Duration::from_millis(2_000),
            ]
        );
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = RetryPolicy {
            max_attempts: 100,
            initial_backoff_ms: 500,
            backoff_multiplier: 10,
        };
        assert_eq!(policy.backoff(90), Duration::from_millis(u64::MAX));
    }
}
