//! Fixed-window admission control shared by every dispatch
//!
//! At most `max_requests` dispatches are admitted per window. The window
//! starts at the first check after a reset and is reset lazily, on the next
//! check made more than `window_ms` after it started.
//!
//! # Example
//!
//! ```text
//! Limit: 5 per 10s
//!
//! t=0s:    window starts, dispatch 1 admitted (count=1)
//! t=0-4s:  dispatches 2..5 admitted (count=5)
//! t=5s:    dispatch 6 rejected (RateLimitExceeded)
//! t=10.1s: window reset, dispatch admitted (count=1)
//! ```

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{Clock, tracing};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RateLimitExceeded;

/// Configuration for the fixed-window rate limiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Admissions allowed per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Window length (milliseconds)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

const fn default_max_requests() -> u32 {
    5
}

const fn default_window_ms() -> u64 {
    10_000
}

impl RateLimitConfig {
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug)]
struct Window {
    count: u32,
    started_at: Instant,
}

impl Window {
    fn expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started_at) > length
    }

    /// Start a fresh window if the current one has run its course
    fn roll(&mut self, now: Instant, length: Duration) {
        if self.expired(now, length) {
            self.count = 0;
            self.started_at = now;
        }
    }
}

/// Rate limiter over a single shared window
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    window: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let window = Window {
            count: 0,
            started_at: clock.now(),
        };

        Self {
            config,
            clock,
            window: Mutex::new(window),
        }
    }

    /// Try to admit one dispatch
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] when the current window is already full.
    pub fn admit(&self) -> Result<(), RateLimitExceeded> {
        let now = self.clock.now();
        let mut window = self.window.lock();
        window.roll(now, self.config.window());

        if window.count >= self.config.max_requests {
            let retry_in = self
                .config
                .window()
                .saturating_sub(now.saturating_duration_since(window.started_at));
            drop(window);
            tracing::debug!(
                limit = self.config.max_requests,
                retry_in_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
                "Rate limit exceeded"
            );
            return Err(RateLimitExceeded);
        }

        window.count += 1;
        Ok(())
    }

    /// Snapshot of the current window
    ///
    /// Read-only: an expired window is reported as empty, but only the next
    /// [`admit`](Self::admit) actually starts a new one.
    pub fn stats(&self) -> RateLimitStats {
        let now = self.clock.now();
        let length = self.config.window();
        let window = self.window.lock();

        let (count, window_remaining) = if window.expired(now, length) {
            (0, length)
        } else {
            (
                window.count,
                length.saturating_sub(now.saturating_duration_since(window.started_at)),
            )
        };

        RateLimitStats {
            count,
            limit: self.config.max_requests,
            window_remaining,
        }
    }
}

/// Statistics for the shared window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Admissions made in the current window
    pub count: u32,
    /// Maximum admissions per window
    pub limit: u32,
    /// Time left before the window can reset
    pub window_remaining: Duration,
}
