//! Resilient email dispatch
//!
//! The [`DispatchEngine`] accepts [`Message`]s and pushes each one through a
//! fixed list of providers, with duplicate suppression, a shared rate limit,
//! per-provider circuit breakers and exponential retry backoff.

pub mod circuit_breaker;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod events;
pub mod policy;
pub mod provider;
pub mod rate_limiter;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::DispatchConfig;
pub use courier_common::{Clock, ManualClock, Message, MessageId, SystemClock};
pub use dedup::DedupStore;
pub use engine::{DispatchEngine, DispatchEngineBuilder, Outcome};
pub use error::{ConfigError, DispatchError, ProviderError, RateLimitExceeded, TransportError};
pub use events::{EventSink, LogEntry};
pub use policy::RetryPolicy;
pub use provider::{ProviderAdapter, ProviderStatus};
pub use rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use tokio_util::sync::CancellationToken;
pub use transport::{ScriptedTransport, SimulatedTransport, Step, Transport, TransportConfig};
