//! Time sources for the recording session.
//!
//! The session never reads the system clock directly. It asks a [`Clock`]
//! for a monotonic millisecond counter (pacing, elapsed time, auto-stop) and
//! for the local wall-clock time (file names), which may be unknown on
//! devices that have not synchronized their clock yet.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Broken-down local date and time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimestamp {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl fmt::Display for LocalTimestamp {
    /// Formats as `YYYY-MM-DD_HH-MM-SS`, safe for file names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}_{:02}-{:02}-{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

pub trait Clock {
    /// Milliseconds since an arbitrary fixed start; never goes backwards.
    fn now_ms(&self) -> u64;

    /// Local wall-clock time, `None` if the clock is not set.
    fn local_time(&self) -> Option<LocalTimestamp>;
}

/// Hand-driven clock for tests and offline replays.
///
/// Clones share the same counter, so a test can keep one copy and advance
/// time while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Rc<Cell<u64>>,
    local: Rc<Cell<Option<LocalTimestamp>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_time(local: LocalTimestamp) -> Self {
        let clock = Self::new();
        clock.local.set(Some(local));
        clock
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.set(ms);
    }

    pub fn set_local_time(&self, local: Option<LocalTimestamp>) {
        self.local.set(local);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn local_time(&self) -> Option<LocalTimestamp> {
        self.local.get()
    }
}
