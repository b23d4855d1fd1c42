//! Time-related utilities

use crate::types::sample::Timestamp;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Get the current system time in nanoseconds since UNIX epoch
pub fn system_time_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Monotonic nanosecond clock anchored to the wall clock.
///
/// One wall-clock reading is taken at creation; every later reading is that
/// anchor plus the monotonic time elapsed since. Readings never go backwards,
/// even if the system clock is stepped while sampling.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall_ns: u64,
    anchor: Instant,
}

impl MonotonicClock {
    /// Anchor a new clock at the current instant
    pub fn new() -> Self {
        Self {
            anchor_wall_ns: system_time_nanos(),
            anchor: Instant::now(),
        }
    }

    /// Nanoseconds since UNIX epoch, monotonic within this clock
    pub fn now_nanos(&self) -> Timestamp {
        self.anchor_wall_ns
            .saturating_add(self.anchor.elapsed().as_nanos() as u64)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time() {
        let nanos = system_time_nanos();

        // After 2020
        assert!(nanos > 1_600_000_000 * 1_000_000_000);
    }

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut last = clock.now_nanos();
        for _ in 0..1000 {
            let now = clock.now_nanos();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_monotonic_clock_tracks_wall_clock() {
        let clock = MonotonicClock::new();
        let wall = system_time_nanos();
        let mono = clock.now_nanos();
        let skew = wall.abs_diff(mono);
        assert!(skew < 1_000_000_000, "skew {}ns", skew);
    }
}
