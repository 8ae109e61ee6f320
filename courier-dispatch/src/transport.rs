//! Delivery transports
//!
//! A [`Transport`] is the one capability a provider needs from the outside
//! world: try to deliver a message and report success text or a failure.
//! Real transports (SMTP relays, HTTP mail APIs) live outside this crate; the
//! ones here are a random [`SimulatedTransport`] for demos and a deterministic
//! [`ScriptedTransport`] for tests.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::{Message, outgoing};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Capability to attempt delivery of a single message
///
/// Timeouts are the transport's own concern; the dispatcher awaits whatever
/// it returns.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Attempt delivery, returning human-readable result text on success
    async fn send(&self, message: &Message) -> Result<String, TransportError>;
}

/// Result text reported by the bundled transports on success
#[must_use]
pub fn sent_text(provider: &str, message: &Message) -> String {
    format!("{provider} sent email to {}", message.to())
}

fn failed_text(provider: &str) -> String {
    format!("{provider} failed to send")
}

/// Transport that fails at random with a fixed probability
pub struct SimulatedTransport {
    name: Arc<str>,
    fail_rate: f64,
    rng: Mutex<StdRng>,
}

impl SimulatedTransport {
    /// `fail_rate` is clamped into `0.0..=1.0`; a `seed` makes the failure
    /// sequence reproducible.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, fail_rate: f64, seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            name: name.into(),
            fail_rate: fail_rate.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }
}

impl fmt::Debug for SimulatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedTransport")
            .field("name", &self.name)
            .field("fail_rate", &self.fail_rate)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn send(&self, message: &Message) -> Result<String, TransportError> {
        let roll: f64 = self.rng.lock().random();
        outgoing!(
            "{} simulating delivery of {} (roll {roll:.3}, fail rate {})",
            self.name,
            message.id(),
            self.fail_rate
        );

        if roll < self.fail_rate {
            Err(TransportError::new(failed_text(&self.name)))
        } else {
            Ok(sent_text(&self.name, message))
        }
    }
}

/// One scripted outcome for [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Succeed,
    /// Fail with the given cause
    Fail(String),
}

/// Deterministic transport that replays a queue of outcomes
///
/// Once the script runs out, every further call produces the fallback
/// outcome. Every call is counted, so tests can tell whether the circuit
/// breaker kept an attempt away from the transport.
#[derive(Debug)]
pub struct ScriptedTransport {
    name: Arc<str>,
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    /// A transport that succeeds unless scripted otherwise
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: Step::Succeed,
            calls: AtomicUsize::new(0),
        }
    }

    /// A transport whose every call fails with `"{name} failed to send"`
    #[must_use]
    pub fn always_failing(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        let cause = failed_text(&name);
        Self::new(name).otherwise(Step::Fail(cause))
    }

    /// A transport that fails `times` times, then succeeds
    #[must_use]
    pub fn failing_times(name: impl Into<Arc<str>>, times: usize) -> Self {
        (0..times).fold(Self::new(name), |transport, _| transport.then_fail())
    }

    /// Queue a success
    #[must_use]
    pub fn then_succeed(self) -> Self {
        self.script.lock().push_back(Step::Succeed);
        self
    }

    /// Queue a failure with the standard cause
    #[must_use]
    pub fn then_fail(self) -> Self {
        let cause = failed_text(&self.name);
        self.then_fail_with(cause)
    }

    /// Queue a failure with a custom cause
    #[must_use]
    pub fn then_fail_with(self, cause: impl Into<String>) -> Self {
        self.script.lock().push_back(Step::Fail(cause.into()));
        self
    }

    /// Outcome used once the script is exhausted
    #[must_use]
    pub fn otherwise(mut self, step: Step) -> Self {
        self.fallback = step;
        self
    }

    /// Number of times [`Transport::send`] has been invoked
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, message: &Message) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match step {
            Step::Succeed => Ok(sent_text(&self.name, message)),
            Step::Fail(cause) => Err(TransportError::new(cause)),
        }
    }
}

const fn default_fail_rate() -> f64 {
    0.3
}

/// Transport selection for a configured provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransportConfig {
    /// Random failures at `fail_rate`, optionally seeded
    Simulated {
        #[serde(default = "default_fail_rate")]
        fail_rate: f64,
        #[serde(default)]
        seed: Option<u64>,
    },
    AlwaysSucceed,
    /// Every attempt fails, with `reason` as the cause when given
    AlwaysFail {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Simulated {
            fail_rate: default_fail_rate(),
            seed: None,
        }
    }
}

impl TransportConfig {
    /// Build the transport for the provider called `name`
    #[must_use]
    pub fn build(&self, name: &str) -> Arc<dyn Transport> {
        match self {
            Self::Simulated { fail_rate, seed } => {
                Arc::new(SimulatedTransport::new(name, *fail_rate, *seed))
            }
            Self::AlwaysSucceed => Arc::new(ScriptedTransport::new(name)),
            Self::AlwaysFail { reason: None } => Arc::new(ScriptedTransport::always_failing(name)),
            Self::AlwaysFail {
                reason: Some(reason),
            } => Arc::new(ScriptedTransport::new(name).otherwise(Step::Fail(reason.clone()))),
        }
    }
}
