//! Clock abstraction for the timing-sensitive parts of dispatch
//!
//! Rate-limit windows, breaker cooldowns and retry backoff all read time and
//! sleep through a [`Clock`], so tests can drive them with [`ManualClock`]
//! instead of waiting in real time.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use parking_lot::Mutex;

/// Source of time and of suspension for the dispatcher
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Monotonic instant, used for all window and cooldown arithmetic
    fn now(&self) -> Instant;

    /// Wall-clock time, used only for log timestamps
    fn now_system(&self) -> SystemTime;

    /// Suspend the calling task for `duration`
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Clock backed by the operating system and tokio's timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Virtual clock that only moves when told to
///
/// A `sleep` does nothing until first polled. It then moves the clock to at
/// least its deadline and returns after a single yield, recording the
/// duration so callers can assert on backoff sequences. Sleeps that run
/// concurrently overlap rather than add up. Clones share the same timeline.
#[derive(Debug, Clone)]
pub struct ManualClock {
    elapsed_ns: Arc<AtomicU64>,
    base_instant: Instant,
    base_system: SystemTime,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Create a clock whose wall time starts at `start`
    #[must_use]
    pub fn with_start_time(start: SystemTime) -> Self {
        Self {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            base_instant: Instant::now(),
            base_system: start,
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        self.elapsed_ns
            .fetch_add(saturating_nanos(duration), Ordering::AcqRel);
    }

    /// Total virtual time elapsed since creation
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }

    /// Every duration passed to [`Clock::sleep`], in call order
    #[must_use]
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn now_system(&self) -> SystemTime {
        self.base_system + self.elapsed()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.sleeps.lock().push(duration);
            let deadline = self
                .elapsed_ns
                .load(Ordering::Acquire)
                .saturating_add(saturating_nanos(duration));
            self.elapsed_ns.fetch_max(deadline, Ordering::AcqRel);
            tokio::task::yield_now().await;
        })
    }
}

/// The Unix epoch plus `secs`, handy for fixed log timestamps in tests
#[must_use]
pub fn epoch_plus(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs)
}
