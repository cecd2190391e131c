//! Per-thread event loop
//!
//! Owns every opaque timer on the thread and the deferred-deletion queue.
//! Nothing here is `Send`: each thread that animates gets its own loop via
//! [`EventLoop::current`].
//!
//! A pass ([`EventLoop::process_events`]) fires every timer that is due and
//! was armed before the pass began, ordered by deadline and then by arm
//! order. Timers armed from inside a callback wait for the next pass, which
//! is what makes zero-delay timers behave as "run on the next loop turn".
//! No `RefCell` borrow is held while a callback runs, so callbacks may start
//! and kill timers (including their own) freely.

use crate::clock::{Clock, SystemClock};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::{Cell, OnceCell, RefCell};
use std::rc::Rc;

new_key_type! {
    /// Handle to a timer registered with an [`EventLoop`]
    pub struct TimerId;
}

/// Passes allowed at a single instant before a run gives up on a timer that
/// keeps re-arming itself with a zero delay
const MAX_PASSES_PER_INSTANT: usize = 10_000;

thread_local! {
    static CURRENT: OnceCell<Rc<EventLoop>> = const { OnceCell::new() };
}

struct TimerEntry {
    interval: u64,
    deadline: u64,
    armed: u64,
    single_shot: bool,
    callback: Rc<dyn Fn()>,
}

/// A single-threaded timer and deferred-work loop
pub struct EventLoop {
    clock: RefCell<Rc<dyn Clock>>,
    timers: RefCell<SlotMap<TimerId, TimerEntry>>,
    deferred: RefCell<Vec<Box<dyn Any>>>,
    arm_counter: Cell<u64>,
    quit_requested: Cell<bool>,
}

impl EventLoop {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock: RefCell::new(clock),
            timers: RefCell::new(SlotMap::with_key()),
            deferred: RefCell::new(Vec::new()),
            arm_counter: Cell::new(0),
            quit_requested: Cell::new(false),
        }
    }

    /// The calling thread's event loop, created on first use with a
    /// [`SystemClock`]
    pub fn current() -> Rc<EventLoop> {
        CURRENT.with(|slot| {
            Rc::clone(slot.get_or_init(|| Rc::new(EventLoop::new(Rc::new(SystemClock::new())))))
        })
    }

    /// The calling thread's event loop if one was already created
    ///
    /// Returns `None` during thread teardown as well.
    pub fn try_current() -> Option<Rc<EventLoop>> {
        CURRENT.try_with(|slot| slot.get().cloned()).ok().flatten()
    }

    // =========================================================================
    // Clock
    // =========================================================================

    /// Replace the time source
    ///
    /// Pending deadlines are kept as absolute times, so this should happen
    /// before any timer is started.
    pub fn set_clock(&self, clock: Rc<dyn Clock>) {
        *self.clock.borrow_mut() = clock;
    }

    pub fn clock(&self) -> Rc<dyn Clock> {
        Rc::clone(&self.clock.borrow())
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.borrow().now_ms()
    }

    // =========================================================================
    // Timers
    // =========================================================================

    /// Start a recurring timer firing every `interval_ms`
    ///
    /// An interval of zero fires once per pass.
    pub fn start_timer<F>(&self, interval_ms: u64, callback: F) -> TimerId
    where
        F: Fn() + 'static,
    {
        self.insert_timer(interval_ms, false, Rc::new(callback))
    }

    /// Start a timer that fires once after `delay_ms` and then disappears
    pub fn single_shot<F>(&self, delay_ms: u64, callback: F) -> TimerId
    where
        F: Fn() + 'static,
    {
        self.insert_timer(delay_ms, true, Rc::new(callback))
    }

    /// Stop a timer; returns `false` if it was not active
    pub fn kill_timer(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().remove(id).is_some()
    }

    pub fn is_timer_active(&self, id: TimerId) -> bool {
        self.timers.borrow().contains_key(id)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Earliest deadline among active timers
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.borrow().values().map(|t| t.deadline).min()
    }

    fn insert_timer(&self, interval: u64, single_shot: bool, callback: Rc<dyn Fn()>) -> TimerId {
        let deadline = self.now_ms() + interval;
        let armed = self.next_arm();
        self.timers.borrow_mut().insert(TimerEntry {
            interval,
            deadline,
            armed,
            single_shot,
            callback,
        })
    }

    fn next_arm(&self) -> u64 {
        let armed = self.arm_counter.get();
        self.arm_counter.set(armed + 1);
        armed
    }

    // =========================================================================
    // Deferred deletion
    // =========================================================================

    /// Drop `value` at the end of the current (or next) pass
    pub fn delete_later<T: 'static>(&self, value: T) {
        self.deferred.borrow_mut().push(Box::new(value));
    }

    pub fn pending_deletions(&self) -> usize {
        self.deferred.borrow().len()
    }

    fn drain_deferred(&self) {
        let deferred = std::mem::take(&mut *self.deferred.borrow_mut());
        // Drop impls may queue more work; the borrow is released first.
        drop(deferred);
    }

    // =========================================================================
    // Running
    // =========================================================================

    /// Run one pass; returns the number of timers fired
    pub fn process_events(&self) -> usize {
        let now = self.now_ms();
        let pass_mark = self.arm_counter.get();

        let mut due: SmallVec<[(u64, u64, TimerId); 8]> = self
            .timers
            .borrow()
            .iter()
            .filter(|(_, t)| t.deadline <= now && t.armed < pass_mark)
            .map(|(id, t)| (t.deadline, t.armed, id))
            .collect();
        due.sort_unstable_by_key(|&(deadline, armed, _)| (deadline, armed));

        let mut fired = 0;
        for (_, _, id) in due {
            let callback = {
                let mut timers = self.timers.borrow_mut();
                let Some(entry) = timers.get_mut(id) else {
                    // Killed by an earlier callback in this pass
                    continue;
                };
                let callback = Rc::clone(&entry.callback);
                if entry.single_shot {
                    timers.remove(id);
                } else {
                    entry.deadline = now + entry.interval;
                    entry.armed = self.next_arm();
                }
                callback
            };
            callback();
            fired += 1;
        }

        self.drain_deferred();
        fired
    }

    /// Run passes until the clock reaches `target_ms`
    ///
    /// Between passes the clock sleeps until the next deadline. With a
    /// [`ManualClock`](crate::ManualClock) this steps exactly from deadline to
    /// deadline.
    pub fn run_until(&self, target_ms: u64) {
        let mut passes_at_instant = 0;
        loop {
            self.process_events();
            let now = self.now_ms();
            match self.next_deadline() {
                Some(deadline) if deadline <= now => {
                    passes_at_instant += 1;
                    if passes_at_instant >= MAX_PASSES_PER_INSTANT {
                        tracing::warn!(
                            "EventLoop: giving up after {} passes at t={}ms, a zero-delay timer keeps re-arming",
                            passes_at_instant,
                            now
                        );
                        break;
                    }
                }
                Some(deadline) if deadline <= target_ms => {
                    passes_at_instant = 0;
                    self.clock().sleep_until(deadline);
                }
                _ => {
                    if now < target_ms {
                        self.clock().sleep_until(target_ms);
                    }
                    break;
                }
            }
        }
    }

    /// Run passes for `ms` milliseconds of clock time
    pub fn run_for(&self, ms: u64) {
        let target = self.now_ms() + ms;
        self.run_until(target);
    }

    /// Run until [`quit`](Self::quit) is called or no timers remain
    pub fn run(&self) {
        self.quit_requested.set(false);
        let mut passes_at_instant = 0;
        while !self.quit_requested.get() {
            self.process_events();
            let Some(deadline) = self.next_deadline() else {
                break;
            };
            let now = self.now_ms();
            if deadline > now {
                passes_at_instant = 0;
                self.clock().sleep_until(deadline);
            } else {
                passes_at_instant += 1;
                if passes_at_instant >= MAX_PASSES_PER_INSTANT {
                    tracing::warn!(
                        "EventLoop: giving up after {} passes at t={}ms, a zero-delay timer keeps re-arming",
                        passes_at_instant,
                        now
                    );
                    break;
                }
            }
        }
    }

    /// Ask a running [`run`](Self::run) to return after the current pass
    pub fn quit(&self) {
        self.quit_requested.set(true);
    }
}
