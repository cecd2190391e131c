//! Time sources
//!
//! All times are whole milliseconds on a monotonic timeline that starts at
//! zero when the clock is created.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// A monotonic millisecond time source
///
/// The event loop asks the clock for the current time and asks it to wait
/// for the next timer deadline. A manual clock implements the wait by
/// jumping straight to the deadline.
pub trait Clock {
    /// Milliseconds elapsed since the clock's origin
    fn now_ms(&self) -> u64;

    /// Block (or pretend to block) until `deadline_ms` has been reached
    fn sleep_until(&self, deadline_ms: u64);
}

/// Wall-clock time backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
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
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_until(&self, deadline_ms: u64) {
        let now = self.now_ms();
        if deadline_ms > now {
            std::thread::sleep(Duration::from_millis(deadline_ms - now));
        }
    }
}

/// A clock that only moves when told to
///
/// Used for deterministic playback and tests. Sleeping sets the time to the
/// requested deadline.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock that starts at `now` instead of zero
    pub fn starting_at(now: u64) -> Self {
        Self {
            now: Cell::new(now),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.get()
    }

    /// Move the clock forward by `ms`
    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }

    /// Jump to `now`; the clock never moves backwards
    pub fn set(&self, now: u64) {
        if now > self.now.get() {
            self.now.set(now);
        }
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_until(&self, deadline_ms: u64) {
        self.set(deadline_ms);
    }
}

/// Reference clock measuring time since an explicit start point
///
/// An invalid (never started or invalidated) timer reports zero elapsed time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElapsedTimer {
    started_at: Option<u64>,
}

impl ElapsedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) measuring from `now`
    pub fn start(&mut self, now: u64) {
        self.started_at = Some(now);
    }

    /// Forget the start point
    pub fn invalidate(&mut self) {
        self.started_at = None;
    }

    pub fn is_valid(&self) -> bool {
        self.started_at.is_some()
    }

    /// Milliseconds since `start`, measured at `now`
    pub fn elapsed(&self, now: u64) -> i64 {
        match self.started_at {
            Some(start) => now.saturating_sub(start) as i64,
            None => 0,
        }
    }
}
