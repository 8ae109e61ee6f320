//! The dispatch engine
//!
//! ## Dispatch Stages
//!
//! 1. **Dedup**: an id that was already sent is skipped without further work
//! 2. **Rate Limiting**: one admission from the shared fixed window
//! 3. **Failover**: providers in configured order, each retried with
//!    exponential backoff until its attempts run out
//! 4. **Outcome**: the first success ends the dispatch; otherwise every
//!    provider was exhausted
//!
//! Every stage writes to the [`EventSink`], which is the audit trail for the
//! whole engine.

use std::{fmt, future::Future, sync::Arc};

use courier_common::{Clock, Message, MessageId, SystemClock, internal};
use tokio_util::sync::CancellationToken;

use crate::{
    config::DispatchConfig,
    dedup::{DedupStore, Reservation},
    error::{ConfigError, DispatchError},
    events::EventSink,
    provider::{ProviderAdapter, ProviderStatus},
    rate_limiter::{RateLimitStats, RateLimiter},
    transport::Transport,
};

/// Final result of a dispatch that was admitted or short-circuited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A provider accepted the message; carries its result text
    Sent(String),
    /// The id was already sent
    DuplicateSkipped,
    /// Every provider used up its attempts
    AllProvidersFailed,
}

impl Outcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// The user-facing result strings
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent(text) => f.write_str(text),
            Self::DuplicateSkipped => f.write_str("Duplicate email skipped"),
            Self::AllProvidersFailed => f.write_str("Failed to send email"),
        }
    }
}

/// Await `future` unless `cancel` fires first
async fn cancellable<F: Future>(future: F, cancel: Option<&CancellationToken>) -> Option<F::Output> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => None,
            output = future => Some(output),
        },
        None => Some(future.await),
    }
}

/// Builder for [`DispatchEngine`]
#[derive(Debug)]
pub struct DispatchEngineBuilder {
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    providers: Vec<(Arc<str>, Arc<dyn Transport>)>,
}

impl DispatchEngineBuilder {
    /// Use `clock` for windows, cooldowns, backoff and log timestamps
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Append a provider; providers are tried in the order they are added
    #[must_use]
    pub fn provider(mut self, name: impl Into<Arc<str>>, transport: Arc<dyn Transport>) -> Self {
        self.providers.push((name.into(), transport));
        self
    }

    /// Validate the configuration and build the engine
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid, no provider
    /// was added, or two providers share a name.
    pub fn build(self) -> Result<DispatchEngine, ConfigError> {
        self.config.validate()?;

        if self.providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        let mut providers: Vec<ProviderAdapter> = Vec::with_capacity(self.providers.len());
        for (name, transport) in self.providers {
            if providers.iter().any(|p| p.name() == &*name) {
                return Err(ConfigError::DuplicateProvider(name.to_string()));
            }
            providers.push(ProviderAdapter::new(
                name,
                transport,
                self.config.circuit_breaker.clone(),
                Arc::clone(&self.clock),
            ));
        }

        internal!(
            level = INFO,
            "Dispatch engine ready with providers [{}]",
            providers
                .iter()
                .map(ProviderAdapter::name)
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(DispatchEngine {
            rate_limiter: RateLimiter::new(self.config.rate_limit.clone(), Arc::clone(&self.clock)),
            dedup: DedupStore::new(),
            events: EventSink::new(Arc::clone(&self.clock)),
            providers,
            clock: self.clock,
            config: self.config,
        })
    }
}

/// Resilient dispatcher over a fixed, ordered list of providers
///
/// Construct one per process (or per isolated test) and share it through an
/// `Arc`; every method takes `&self` and is safe to call concurrently.
#[derive(Debug)]
pub struct DispatchEngine {
    config: DispatchConfig,
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
    dedup: DedupStore,
    providers: Vec<ProviderAdapter>,
    events: EventSink,
}

impl DispatchEngine {
    /// Start building an engine that uses the system clock
    #[must_use]
    pub fn builder(config: DispatchConfig) -> DispatchEngineBuilder {
        DispatchEngineBuilder {
            config,
            clock: Arc::new(SystemClock),
            providers: Vec::new(),
        }
    }

    /// Dispatch `message` through the first provider that accepts it
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RateLimitExceeded`] if the message was not
    /// admitted. Provider failures never surface here; they resolve to
    /// [`Outcome::AllProvidersFailed`] once every provider is exhausted.
    #[tracing::instrument(level = "debug", skip_all, fields(id = %message.id()))]
    pub async fn dispatch(&self, message: &Message) -> Result<Outcome, DispatchError> {
        self.run(message, None).await
    }

    /// Like [`dispatch`](Self::dispatch), but gives up at the next
    /// suspension point once `cancel` fires
    ///
    /// # Errors
    ///
    /// As for `dispatch`, plus [`DispatchError::Cancelled`].
    #[tracing::instrument(level = "debug", skip_all, fields(id = %message.id()))]
    pub async fn dispatch_with_cancel(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<Outcome, DispatchError> {
        self.run(message, Some(cancel)).await
    }

    async fn run(
        &self,
        message: &Message,
        cancel: Option<&CancellationToken>,
    ) -> Result<Outcome, DispatchError> {
        let id = message.id();

        let reservation = loop {
            match self.dedup.reserve(id) {
                Reservation::Acquired(reservation) => break reservation,
                Reservation::Duplicate => {
                    self.events
                        .record(format!("Duplicate email ID: {id}, skipping."));
                    return Ok(Outcome::DuplicateSkipped);
                }
                Reservation::InFlight(pending) => {
                    internal!(
                        level = DEBUG,
                        "Email ID {id} is already in flight, waiting for it to settle"
                    );
                    if cancellable(pending.settled(), cancel).await.is_none() {
                        return Err(self.cancelled(id));
                    }
                }
            }
        };

        if let Err(error) = self.rate_limiter.admit() {
            self.events
                .record(format!("Rate limit exceeded, rejecting email ID: {id}"));
            return Err(error.into());
        }

        let retry = &self.config.retry;
        for provider in &self.providers {
            let mut attempt = 0;

            while retry.should_retry(attempt) {
                let Some(result) = cancellable(provider.attempt_deliver(message), cancel).await
                else {
                    return Err(self.cancelled(id));
                };

                match result {
                    Ok(text) => {
                        reservation.commit();
                        self.events.record(text.clone());
                        return Ok(Outcome::Sent(text));
                    }
                    Err(error) => {
                        self.events.record(format!(
                            "Attempt {} failed with {}: {error}",
                            attempt + 1,
                            provider.name()
                        ));
                        let backoff = retry.backoff(attempt);
                        attempt += 1;

                        if cancellable(self.clock.sleep(backoff), cancel).await.is_none() {
                            return Err(self.cancelled(id));
                        }
                    }
                }
            }

            self.events
                .record(format!("{} exhausted, switching provider...", provider.name()));
        }

        self.events.record("All providers failed");
        Ok(Outcome::AllProvidersFailed)
    }

    fn cancelled(&self, id: &MessageId) -> DispatchError {
        self.events
            .record(format!("Dispatch of email ID: {id} cancelled"));
        DispatchError::Cancelled
    }

    /// Newline-joined dump of every event since the engine was built
    pub fn logs(&self) -> String {
        self.events.dump()
    }

    #[must_use]
    pub const fn events(&self) -> &EventSink {
        &self.events
    }

    /// Health of every provider, in priority order
    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        self.providers.iter().map(ProviderAdapter::status).collect()
    }

    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.rate_limiter.stats()
    }

    /// Returns `true` if `id` has been sent by this engine
    pub fn is_sent(&self, id: &MessageId) -> bool {
        self.dedup.contains(id)
    }

    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use courier_common::ManualClock;

    use super::*;
    use crate::transport::ScriptedTransport;

    fn engine(transport: ScriptedTransport) -> DispatchEngine {
        DispatchEngine::builder(DispatchConfig::default())
            .clock(Arc::new(ManualClock::new()))
            .provider("ProviderA", Arc::new(transport))
            .build()
            .unwrap()
    }

    #[test]
    fn test_outcome_strings() {
        assert_eq!(
            Outcome::Sent("ProviderA sent email to x@example.com".into()).to_string(),
            "ProviderA sent email to x@example.com"
        );
        assert_eq!(
            Outcome::DuplicateSkipped.to_string(),
            "Duplicate email skipped"
        );
        assert_eq!(
            Outcome::AllProvidersFailed.to_string(),
            "Failed to send email"
        );
    }

    #[test]
    fn test_builder_requires_providers() {
        let result = DispatchEngine::builder(DispatchConfig::default()).build();
        assert_eq!(result.unwrap_err(), ConfigError::NoProviders);
    }

    #[test]
    fn test_builder_rejects_duplicate_names() {
        let result = DispatchEngine::builder(DispatchConfig::default())
            .provider("Same", Arc::new(ScriptedTransport::new("Same")))
            .provider("Same", Arc::new(ScriptedTransport::new("Same")))
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigError::DuplicateProvider("Same".to_string())
        );
    }

    #[test]
    fn test_builder_validates_config() {
        let mut config = DispatchConfig::default();
        config.rate_limit.max_requests = 0;

        let result = DispatchEngine::builder(config)
            .provider("ProviderA", Arc::new(ScriptedTransport::new("ProviderA")))
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { field: "rate_limit.max_requests", .. }
        ));
    }

    #[tokio::test]
    async fn test_first_attempt_success_logs_once() {
        let engine = engine(ScriptedTransport::new("ProviderA"));
        let message = Message::new("e-1", "x@example.com", "s", "b");

        let outcome = engine.dispatch(&message).await.unwrap();
        assert!(outcome.is_sent());
        assert_eq!(
            engine.events().lines(),
            vec!["ProviderA sent email to x@example.com"]
        );
        assert!(engine.is_sent(message.id()));
    }
}
