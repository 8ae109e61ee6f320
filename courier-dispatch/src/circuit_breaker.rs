//! Per-provider circuit breaker
//!
//! Stops sending attempts to a provider for a cooldown period after it has
//! failed too many times in a row.
//!
//! # State Transitions
//!
//! ```text
//! ┌─────────┐  consecutive failures >= threshold  ┌──────┐
//! │ Closed  │ ──────────────────────────────────> │ Open │ <─┐
//! └─────────┘                                     └──────┘   │
//!     ^                                              │       │
//!     │                                              │ cooldown elapsed,
//!     │                                              │ next attempt
//!     │  Success          ┌───────────────┐          v       │
//!     └───────────────────│   Half-Open   │ <────────┘       │
//!                         └───────────────┘                  │
//!                                 │ Failure                  │
//!                                 └──────────────────────────┘
//! ```
//!
//! While open, attempts are rejected without reaching the transport and do
//! not count as failures. The first attempt after the cooldown becomes the
//! half-open probe; concurrent attempts are rejected until it reports back.
//!
//! # Example
//!
//! ```text
//! Threshold: 3 consecutive failures
//! Cooldown: 10 seconds
//!
//! t=0s:     3rd failure -> Open
//! t=0-10s:  attempts rejected immediately
//! t=10s:    next attempt is the probe (Half-Open)
//! t=10.2s:  probe succeeds -> Closed, failure count reset
//! ```

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{Clock, tracing};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open before a probe is allowed (milliseconds)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_ms() -> u64 {
    10_000
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation, attempts pass through
    Closed,
    /// Tripped, attempts are rejected until the cooldown elapses
    Open,
    /// Cooldown elapsed, a single probe attempt decides what happens next
    HalfOpen,
}

#[derive(Debug)]
struct BreakerData {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl BreakerData {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }
}

/// Circuit breaker guarding a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: Arc<str>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    data: Mutex<BreakerData>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(
        provider: impl Into<Arc<str>>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider: provider.into(),
            config,
            clock,
            data: Mutex::new(BreakerData::new()),
        }
    }

    /// Ask to make one attempt
    ///
    /// Returns `None` while the circuit is open (or a half-open probe is
    /// already in flight). The returned permit must be settled with
    /// [`Permit::succeed`] or [`Permit::fail`]; dropping it unsettled
    /// leaves the counters untouched.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let now = self.clock.now();
        let mut data = self.data.lock();

        let probe = match data.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = data.opened_at.is_some_and(|opened_at| {
                    now.saturating_duration_since(opened_at) >= self.config.cooldown()
                });
                if !cooled {
                    return None;
                }

                data.state = CircuitState::HalfOpen;
                data.probe_in_flight = true;
                tracing::info!(
                    provider = %self.provider,
                    "Circuit breaker entering HALF-OPEN state - probing provider"
                );
                true
            }
            CircuitState::HalfOpen => {
                if data.probe_in_flight {
                    return None;
                }
                data.probe_in_flight = true;
                true
            }
        };

        Some(Permit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Returns `true` if the circuit transitioned to Closed
    fn record_success(&self, probe: bool) -> bool {
        let mut data = self.data.lock();
        data.consecutive_failures = 0;

        match data.state {
            CircuitState::HalfOpen => {
                data.state = CircuitState::Closed;
                data.opened_at = None;
                data.probe_in_flight = false;
                tracing::info!(
                    provider = %self.provider,
                    probe,
                    "Circuit breaker CLOSED - normal operation resumed"
                );
                true
            }
            CircuitState::Closed => false,
            CircuitState::Open => {
                // An attempt admitted before the trip finished late
                tracing::debug!(
                    provider = %self.provider,
                    "Success recorded while circuit is open"
                );
                false
            }
        }
    }

    /// Returns `true` if the circuit transitioned to Open
    fn record_failure(&self, probe: bool) -> bool {
        let now = self.clock.now();
        let mut data = self.data.lock();
        data.consecutive_failures = data.consecutive_failures.saturating_add(1);

        match data.state {
            CircuitState::Closed => {
                if data.consecutive_failures < self.config.failure_threshold {
                    return false;
                }
                data.open(now);
                tracing::warn!(
                    provider = %self.provider,
                    failure_count = data.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    cooldown_ms = self.config.cooldown_ms,
                    "Circuit breaker OPENED - rejecting attempts until cooldown elapses"
                );
                true
            }
            CircuitState::HalfOpen => {
                data.open(now);
                tracing::warn!(
                    provider = %self.provider,
                    failure_count = data.consecutive_failures,
                    probe,
                    "Circuit breaker probe failed - reopening circuit"
                );
                true
            }
            CircuitState::Open => {
                // An attempt admitted before the trip failed late
                data.opened_at = Some(now);
                tracing::debug!(
                    provider = %self.provider,
                    failure_count = data.consecutive_failures,
                    "Failure recorded while circuit is open - cooldown restarted"
                );
                false
            }
        }
    }

    fn release_probe(&self) {
        let mut data = self.data.lock();
        if data.state == CircuitState::HalfOpen {
            data.probe_in_flight = false;
        }
    }

    /// Returns `true` if an attempt made now would be refused
    ///
    /// Unlike [`state`](Self::state), this accounts for an elapsed cooldown:
    /// a circuit still marked Open whose cooldown has passed will admit the
    /// next attempt.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let data = self.data.lock();

        match data.state {
            CircuitState::Closed => false,
            CircuitState::Open => data.opened_at.is_some_and(|opened_at| {
                now.saturating_duration_since(opened_at) < self.config.cooldown()
            }),
            CircuitState::HalfOpen => data.probe_in_flight,
        }
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.data.lock().state
    }

    /// Snapshot for monitoring and tests
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let data = self.data.lock();
        CircuitBreakerStats {
            state: data.state,
            consecutive_failures: data.consecutive_failures,
            opened_at: data.opened_at,
        }
    }
}

/// Admission to make one attempt through a [`CircuitBreaker`]
#[derive(Debug)]
#[must_use = "a permit must be settled with `succeed` or `fail`"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl Permit<'_> {
    /// Whether this attempt is the half-open probe
    pub const fn is_probe(&self) -> bool {
        self.probe
    }

    /// Report success; returns `true` if the circuit closed
    pub fn succeed(mut self) -> bool {
        self.settled = true;
        self.breaker.record_success(self.probe)
    }

    /// Report failure; returns `true` if the circuit opened
    pub fn fail(mut self) -> bool {
        self.settled = true;
        self.breaker.record_failure(self.probe)
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    /// When the circuit last opened, if it has not closed since
    pub opened_at: Option<Instant>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use courier_common::ManualClock;

    use super::*;

    fn breaker(clock: &ManualClock) -> CircuitBreaker {
        CircuitBreaker::new(
            "ProviderA",
            CircuitBreakerConfig::default(),
            Arc::new(clock.clone()),
        )
    }

    fn fail_times(breaker: &CircuitBreaker, n: usize) {
        for _ in 0..n {
            breaker.try_acquire().expect("circuit should allow").fail();
        }
    }

    #[test]
    fn test_circuit_breaker_closed_to_open() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        assert_eq!(breaker.state(), CircuitState::Closed);

        fail_times(&breaker, 2);
        assert_eq!(breaker.state(), CircuitState::Closed);

        let tripped = breaker.try_acquire().expect("still closed").fail();
        assert!(tripped);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_rejections_do_not_count_as_failures() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 3);

        for _ in 0..5 {
            assert!(breaker.try_acquire().is_none());
        }
        assert_eq!(breaker.stats().consecutive_failures, 3);
    }

    #[test]
    fn test_cooldown_boundary() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 3);
        let opened_at = breaker.stats().opened_at.expect("open circuit has a timestamp");

        clock.advance(Duration::from_millis(9_999));
        assert!(breaker.try_acquire().is_none());

        clock.advance(Duration::from_millis(1));
        let permit = breaker.try_acquire().expect("cooldown elapsed");
        assert!(permit.is_probe());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().opened_at, Some(opened_at));
        drop(permit);
    }

    #[test]
    fn test_half_open_success_closes() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 3);
        clock.advance(Duration::from_secs(10));

        let closed = breaker.try_acquire().expect("probe").succeed();
        assert!(closed);

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.opened_at, None);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 3);
        clock.advance(Duration::from_secs(11));
        let reopen_time = clock.now();

        let reopened = breaker.try_acquire().expect("probe").fail();
        assert!(reopened);

        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.consecutive_failures, 4);
        assert_eq!(stats.opened_at, Some(reopen_time));
        assert!(breaker.try_acquire().is_none());
    }

    #[test]
    fn test_single_probe_in_flight() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 3);
        clock.advance(Duration::from_secs(10));

        let probe = breaker.try_acquire().expect("probe");
        assert!(breaker.try_acquire().is_none());
        probe.succeed();
        assert!(breaker.try_acquire().is_some());
    }

    #[test]
    fn test_dropped_probe_releases_slot() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 3);
        clock.advance(Duration::from_secs(10));

        drop(breaker.try_acquire().expect("probe"));
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().consecutive_failures, 3);

        let permit = breaker.try_acquire().expect("slot released");
        assert!(permit.is_probe());
        permit.fail();
    }

    #[test]
    fn test_late_failure_restarts_cooldown() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        fail_times(&breaker, 2);

        let first = breaker.try_acquire().expect("closed");
        let straggler = breaker.try_acquire().expect("closed");
        assert!(first.fail());

        clock.advance(Duration::from_secs(5));
        assert!(!straggler.fail());
        let stats = breaker.stats();
        assert_eq!(stats.state, CircuitState::Open);
        assert_eq!(stats.opened_at, Some(clock.now()));
        assert_eq!(stats.consecutive_failures, 4);

        clock.advance(Duration::from_secs(5));
        assert!(breaker.try_acquire().is_none());

        clock.advance(Duration::from_secs(5));
        assert!(breaker.try_acquire().expect("cooldown elapsed").is_probe());
    }

    #[test]
    fn test_is_open_tracks_cooldown() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);
        assert!(!breaker.is_open());

        fail_times(&breaker, 3);
        assert!(breaker.is_open());

        clock.advance(Duration::from_secs(10));
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.is_open());

        let permit = breaker.try_acquire().expect("probe");
        assert!(breaker.is_open());
        permit.succeed();
        assert!(!breaker.is_open());
    }

    #[test]
    fn test_circuit_breaker_success_resets_failures() {
        let clock = ManualClock::new();
        let breaker = breaker(&clock);

        fail_times(&breaker, 2);
        breaker.try_acquire().expect("closed").succeed();
        fail_times(&breaker, 2);

        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 2);
    }
}
