//! Wall clock and monotonic time for the native host.

use std::time::Instant;

use camrec_core::clock::{Clock, LocalTimestamp};
use chrono::{Datelike, Local, Timelike};

/// Earliest year accepted as a set clock; boards without RTC boot in 1970
const MIN_VALID_YEAR: i32 = 2020;

/// [`Clock`] backed by [`Instant`] and the local time zone.
#[derive(Debug, Clone)]
pub struct SystemClock {
    start_time: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    fn local_time(&self) -> Option<LocalTimestamp> {
        let now = Local::now();
        if now.year() < MIN_VALID_YEAR {
            return None;
        }
        Some(LocalTimestamp {
            year: now.year(),
            month: now.month(),
            day: now.day(),
            hour: now.hour(),
            minute: now.minute(),
            second: now.second(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.now_ms() >= a + 5);
    }

    #[test]
    fn test_local_time_is_set() {
        let ts = SystemClock::new().local_time().unwrap();
        assert!(ts.year >= MIN_VALID_YEAR);
        assert!((1..=12).contains(&ts.month));
    }
}
