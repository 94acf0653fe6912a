//! Time source and cooperative yield hook
//!
//! All blocking operations are bounded polling loops. They measure elapsed
//! time and sleep or yield through this trait, so the same loops run
//! against real time on a host and against a manual clock in tests.

use std::time::{Duration, Instant};

/// Monotonic clock with delay and yield.
pub trait Clock {
    /// Time since an arbitrary fixed epoch.
    fn now(&self) -> Duration;

    /// Block for at least `duration`.
    fn delay(&mut self, duration: Duration);

    /// Let other work make progress between polls.
    fn yield_now(&mut self) {}

    /// Elapsed time since `start` (a value previously returned by `now`).
    fn since(&self, start: Duration) -> Duration {
        self.now().saturating_sub(start)
    }
}

impl<K: Clock + ?Sized> Clock for &mut K {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration);
    }

    fn yield_now(&mut self) {
        (**self).yield_now();
    }
}

/// Wall clock backed by `std::time::Instant` and `std::thread`.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    /// Clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn yield_now(&mut self) {
        std::thread::yield_now();
    }
}

/// Manually driven clock.
///
/// Time only moves when something delays or yields. Each yield advances
/// by `yield_step` so polling loops that only yield still see time pass.
#[derive(Debug, Clone, Copy)]
pub struct ManualClock {
    now: Duration,
    yield_step: Duration,
}

impl ManualClock {
    /// Clock at `start` advancing 100 µs per yield.
    pub const fn starting_at(start: Duration) -> Self {
        Self {
            now: start,
            yield_step: Duration::from_micros(100),
        }
    }

    /// Override how far a yield advances the clock.
    #[must_use]
    pub const fn with_yield_step(mut self, step: Duration) -> Self {
        self.yield_step = step;
        self
    }

    /// Move time forward.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Duration::ZERO)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn delay(&mut self, duration: Duration) {
        self.now += duration;
    }

    fn yield_now(&mut self) {
        self.now += self.yield_step;
    }
}
