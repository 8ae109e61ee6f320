//! Typed errors for dispatch operations.
//!
//! Only [`DispatchError`] ever reaches the caller of
//! [`DispatchEngine::dispatch`](crate::DispatchEngine::dispatch). Provider
//! level failures ([`ProviderError`]) are recovered by the retry loop and
//! show up in the event log instead.

use thiserror::Error;

/// Admission denied by the fixed-window rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Rate limit exceeded")]
pub struct RateLimitExceeded;

/// Errors returned to the caller of a dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The rate limiter rejected the message; no provider was attempted.
    #[error(transparent)]
    RateLimitExceeded(#[from] RateLimitExceeded),

    /// The caller's cancellation token fired while the dispatch was in flight.
    #[error("Dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Returns `true` if the caller should simply try again later.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded(_))
    }

    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failure reported by a [`Transport`](crate::Transport), carrying a
/// human-readable cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self(cause.into())
    }

    #[must_use]
    pub fn cause(&self) -> &str {
        &self.0
    }
}

/// Failure of a single delivery attempt through one provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider's circuit is open; the transport was not invoked.
    #[error("{provider} circuit is open")]
    CircuitOpen { provider: String },

    /// The transport was invoked and failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ProviderError {
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Invalid dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("At least one provider must be configured")]
    NoProviders,

    #[error("Duplicate provider name: {0}")]
    DuplicateProvider(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}
