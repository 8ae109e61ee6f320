//! Dispatcher configuration
//!
//! Deserialized from the `dispatch` section of the application config. Every
//! field has a default, so an empty `()` yields the stock limits: 5 dispatches
//! per 10 seconds, circuits that open after 3 consecutive failures for 10
//! seconds, and 3 attempts per provider with backoff starting at 500ms.

use serde::{Deserialize, Serialize};

use crate::{
    circuit_breaker::CircuitBreakerConfig, error::ConfigError, policy::RetryPolicy,
    rate_limiter::RateLimitConfig,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl DispatchConfig {
    /// Reject values that would make the engine useless or stall forever
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            })
        };

        if self.rate_limit.max_requests == 0 {
            return invalid("rate_limit.max_requests", "must be at least 1");
        }
        if self.rate_limit.window_ms == 0 {
            return invalid("rate_limit.window_ms", "must be greater than 0");
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return invalid("circuit_breaker.failure_threshold", "must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts", "must be at least 1");
        }
        if self.retry.backoff_multiplier == 0 {
            return invalid("retry.backoff_multiplier", "must be at least 1");
        }

        Ok(())
    }
}
