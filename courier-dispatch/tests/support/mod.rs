//! Engine fixtures shared by the integration tests
#![allow(dead_code, clippy::unwrap_used)] // Not every test file uses every helper

use std::{
    future,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use courier_common::time::epoch_plus;
use courier_dispatch::{
    DispatchConfig, DispatchEngine, ManualClock, Message, ScriptedTransport, Transport,
    TransportError,
};

/// An engine on a manual clock, plus handles to everything behind it
pub struct Harness {
    pub engine: DispatchEngine,
    pub clock: ManualClock,
    pub transports: Vec<Arc<ScriptedTransport>>,
}

impl Harness {
    /// Providers are named after their transports, in the given order
    pub fn new(config: DispatchConfig, transports: Vec<ScriptedTransport>) -> Self {
        let clock = ManualClock::with_start_time(epoch_plus(1_700_000_000));
        let transports: Vec<_> = transports.into_iter().map(Arc::new).collect();

        let builder = transports.iter().enumerate().fold(
            DispatchEngine::builder(config).clock(Arc::new(clock.clone())),
            |builder, (index, transport)| {
                builder.provider(
                    provider_name(index),
                    Arc::clone(transport) as Arc<dyn Transport>,
                )
            },
        );

        Self {
            engine: builder.build().unwrap(),
            clock,
            transports,
        }
    }

    /// Default limits with `ProviderA` and `ProviderB`
    pub fn two_providers(a: ScriptedTransport, b: ScriptedTransport) -> Self {
        Self::new(DispatchConfig::default(), vec![a, b])
    }

    pub fn lines(&self) -> Vec<String> {
        self.engine.events().lines()
    }
}

/// `ProviderA`, `ProviderB`, ...
pub fn provider_name(index: usize) -> String {
    let letter = char::from(b'A' + u8::try_from(index).unwrap());
    format!("Provider{letter}")
}

pub fn message(id: &str) -> Message {
    Message::new(id, "user@example.com", "Hello", "Hi there")
}

/// Transport whose sends never complete
#[derive(Debug, Default)]
pub struct StalledTransport {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&self, _message: &Message) -> Result<String, TransportError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        future::pending().await
    }
}
