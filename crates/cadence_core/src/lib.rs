//! Cadence Core Runtime
//!
//! The collaborators the animation engine runs on top of:
//!
//! - **Clocks**: a monotonic system clock, a manual clock for deterministic
//!   playback, and an `ElapsedTimer` reference clock
//! - **Event Loop**: one per thread, owning opaque timers and the
//!   deferred-deletion queue
//! - **Basic Timers**: restartable handles over a single event loop timer
//! - **Notifications**: synchronous, re-entrant listener lists
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use std::cell::Cell;
//! use cadence_core::{EventLoop, ManualClock};
//!
//! let clock = Rc::new(ManualClock::new());
//! let event_loop = EventLoop::current();
//! event_loop.set_clock(clock.clone());
//!
//! let fired = Rc::new(Cell::new(0));
//! let counter = fired.clone();
//! event_loop.start_timer(10, move || counter.set(counter.get() + 1));
//!
//! event_loop.run_for(35);
//! assert_eq!(fired.get(), 3);
//! assert_eq!(clock.now(), 35);
//! ```

pub mod clock;
pub mod event_loop;
pub mod notify;
pub mod timer;

pub use clock::{Clock, ElapsedTimer, ManualClock, SystemClock};
pub use event_loop::{EventLoop, TimerId};
pub use notify::{ListenerId, Notifier};
pub use timer::BasicTimer;
