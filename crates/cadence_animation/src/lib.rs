//! Cadence Animation
//!
//! A unified animation timing engine. Every animation running on a thread is
//! driven by that thread's [`UnifiedTimer`], which coalesces all of them onto
//! a single tick source and picks between three modes:
//!
//! - **continuous**: an [`AnimationDriver`] ticks at the timing interval
//!   while any leaf animation runs
//! - **sparse**: only pause animations run, so one timer fires when the
//!   nearest of them ends
//! - **idle**: nothing runs and no timer is armed
//!
//! # Example
//!
//! ```rust
//! use cadence_animation::{LeafAnimation, State};
//! use cadence_core::{EventLoop, ManualClock};
//! use std::rc::Rc;
//!
//! let clock = Rc::new(ManualClock::new());
//! let event_loop = EventLoop::current();
//! event_loop.set_clock(clock.clone());
//!
//! let slide = LeafAnimation::with_callback(64, |_, time| {
//!     let _progress = time as f32 / 64.0;
//! });
//! slide.start();
//!
//! event_loop.run_for(100);
//! assert_eq!(slide.state(), State::Stopped);
//! assert_eq!(slide.current_time(), 64);
//! ```

pub mod animation;
pub mod config;
pub mod driver;
pub mod error;
pub mod group;
pub mod leaf;
pub mod pause;
pub mod unified_timer;

pub use animation::{
    Animation, AnimationKind, DeletionPolicy, Direction, Drivable, State, WeakAnimation,
};
pub use config::TimerConfig;
pub use driver::{
    install_driver, is_driver_installed, uninstall_driver, AnimationDriver,
    DefaultAnimationDriver, DriverState,
};
pub use error::{AnimationError, Result};
pub use group::ParallelAnimationGroup;
pub use leaf::LeafAnimation;
pub use pause::PauseAnimation;
pub use unified_timer::UnifiedTimer;
