//! Delivery providers: a named transport behind its own circuit breaker

use std::{sync::Arc, time::Instant};

use courier_common::{Clock, Message, outgoing, tracing};

use crate::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    error::ProviderError,
    transport::Transport,
};

/// Point-in-time view of a provider's health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub name: String,
    pub consecutive_failures: u32,
    /// `true` while the breaker would refuse an attempt
    pub circuit_open: bool,
    pub circuit_opened_at: Option<Instant>,
    pub state: CircuitState,
}

/// One delivery channel
///
/// Owns the breaker for its transport; nothing else mutates that state.
#[derive(Debug)]
pub struct ProviderAdapter {
    name: Arc<str>,
    breaker: CircuitBreaker,
    transport: Arc<dyn Transport>,
}

impl ProviderAdapter {
    #[must_use]
    pub fn new(
        name: impl Into<Arc<str>>,
        transport: Arc<dyn Transport>,
        breaker: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        Self {
            breaker: CircuitBreaker::new(Arc::clone(&name), breaker, clock),
            name,
            transport,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make one delivery attempt through the breaker
    ///
    /// # Errors
    ///
    /// [`ProviderError::CircuitOpen`] if the breaker refused the attempt (the
    /// transport is not called), or [`ProviderError::Transport`] if the
    /// transport failed.
    pub async fn attempt_deliver(&self, message: &Message) -> Result<String, ProviderError> {
        let Some(permit) = self.breaker.try_acquire() else {
            tracing::debug!(provider = %self.name, id = %message.id(), "Circuit open, attempt rejected");
            return Err(ProviderError::CircuitOpen {
                provider: self.name.to_string(),
            });
        };

        outgoing!(
            level = DEBUG,
            "Handing {} to {}{}",
            message.id(),
            self.name,
            if permit.is_probe() { " (probe)" } else { "" }
        );

        match self.transport.send(message).await {
            Ok(text) => {
                permit.succeed();
                Ok(text)
            }
            Err(error) => {
                permit.fail();
                Err(error.into())
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> ProviderStatus {
        let stats = self.breaker.stats();
        ProviderStatus {
            name: self.name.to_string(),
            consecutive_failures: stats.consecutive_failures,
            circuit_open: self.breaker.is_open(),
            circuit_opened_at: stats.opened_at,
            state: stats.state,
        }
    }
}
