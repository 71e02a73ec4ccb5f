// Absolute-deadline pacing for the periodic loops
//
// Each tick advances the deadline by one period. If the loop has already run
// past that point, the schedule restarts from now instead of bursting through
// the missed ticks.

use std::time::{Duration, Instant};

/// A loop rate that has no usable period
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Rate must be a positive, finite number of Hz, got {0}")]
pub struct InvalidRate(pub f64);

/// Period for a rate in Hz
pub fn period_from_hz(hz: f64) -> Result<Duration, InvalidRate> {
    if !(hz > 0.0) || !hz.is_finite() {
        return Err(InvalidRate(hz));
    }
    Duration::try_from_secs_f64(1.0 / hz).map_err(|_| InvalidRate(hz))
}

#[derive(Debug, Clone)]
pub struct Pacer {
    period: Duration,
    deadline: Instant,
}

impl Pacer {
    /// The first tick is due at `start`
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            deadline: start,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Move to the next deadline given the time the tick finished
    pub fn advance(&mut self, now: Instant) -> Instant {
        let next = self.deadline + self.period;
        self.deadline = if next <= now { now + self.period } else { next };
        self.deadline
    }
}
