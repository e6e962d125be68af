//! Time sources for the scheduler.
//!
//! Processing delays are the scheduler's only suspension point. A
//! [`SimulatedClock`] jumps straight to the next completion so a whole run
//! finishes instantly with the same timestamps a real run would record;
//! a [`WallClock`] actually waits.

use crate::Timestamp;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for a scheduler run.
pub trait Clock {
    /// Current time in ms since the epoch.
    fn now(&self) -> Timestamp;

    /// Suspend until `t`. Never moves time backwards.
    fn advance_to(&mut self, t: Timestamp);
}

/// Deterministic clock that advances only when told to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedClock {
    now: Timestamp,
}

impl SimulatedClock {
    /// Clock starting at `start`.
    #[must_use]
    pub const fn starting_at(start: Timestamp) -> Self {
        Self { now: start }
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> Timestamp {
        self.now
    }

    fn advance_to(&mut self, t: Timestamp) {
        self.now = self.now.max(t);
    }
}

/// System clock; advancing sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

/// Milliseconds since the Unix epoch according to the system clock.
#[must_use]
pub fn epoch_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

impl Clock for WallClock {
    fn now(&self) -> Timestamp {
        epoch_millis()
    }

    fn advance_to(&mut self, t: Timestamp) {
        let remaining = t - self.now();
        if remaining > 0 {
            std::thread::sleep(Duration::from_millis(remaining as u64));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_clock_never_goes_back() {
        let mut clock = SimulatedClock::starting_at(1_000);
        clock.advance_to(2_500);
        assert_eq!(clock.now(), 2_500);
        clock.advance_to(2_000);
        assert_eq!(clock.now(), 2_500);
    }

    #[test]
    fn wall_clock_waits() {
        let mut clock = WallClock;
        let start = clock.now();
        clock.advance_to(start + 20);
        assert!(clock.now() >= start + 20);
    }
}
