//! Time source for polling. Production sleeps; tests advance a fake clock.

#![allow(missing_docs)]

use std::fmt;
use std::time::{Duration, Instant};

/// Monotonic time source with an injectable sleep.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Elapsed time since this clock's origin.
    fn now(&self) -> Duration;

    /// Block for `duration`. Fakes advance `now()` instead.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
