//! Restartable timer handle

use crate::event_loop::{EventLoop, TimerId};
use std::cell::Cell;

/// Owns at most one recurring timer on the calling thread's event loop
///
/// Starting an active timer replaces it, so the callback and interval always
/// reflect the most recent `start`.
#[derive(Debug, Default)]
pub struct BasicTimer {
    id: Cell<Option<TimerId>>,
}

impl BasicTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)start the timer with a new interval and callback
    pub fn start<F>(&self, interval_ms: u64, callback: F)
    where
        F: Fn() + 'static,
    {
        let event_loop = EventLoop::current();
        if let Some(id) = self.id.take() {
            event_loop.kill_timer(id);
        }
        self.id.set(Some(event_loop.start_timer(interval_ms, callback)));
    }

    pub fn stop(&self) {
        if let Some(id) = self.id.take() {
            if let Some(event_loop) = EventLoop::try_current() {
                event_loop.kill_timer(id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.id.get().is_some()
    }

    pub fn timer_id(&self) -> Option<TimerId> {
        self.id.get()
    }
}
