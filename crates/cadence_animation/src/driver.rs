//! Tick sources
//!
//! An [`AnimationDriver`] produces the pulses that advance every animation on
//! a thread. The [`DefaultAnimationDriver`] is a recurring event loop timer at
//! the scheduler's timing interval. Embedders with their own frame clock
//! (a vsync callback, a recorder stepping frames) install a custom driver and
//! call [`AnimationDriver::advance`] once per pulse.

use crate::error::{AnimationError, Result};
use crate::unified_timer::UnifiedTimer;
use cadence_core::BasicTimer;
use std::cell::Cell;
use std::rc::{Rc, Weak};

/// Running flag shared by every driver implementation
#[derive(Debug, Default)]
pub struct DriverState {
    running: Cell<bool>,
}

impl DriverState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A source of animation ticks
///
/// Implementors supply [`driver_state`](Self::driver_state) and usually the
/// `started` / `stopped` hooks; `start`, `stop`, `is_running` and `advance`
/// should not be overridden.
pub trait AnimationDriver {
    fn driver_state(&self) -> &DriverState;

    /// Called when the scheduler wants ticks to begin
    fn started(&self) {}

    /// Called when the scheduler no longer needs ticks
    fn stopped(&self) {}

    fn start(&self) {
        let state = self.driver_state();
        if !state.running.get() {
            self.started();
            state.running.set(true);
        }
    }

    fn stop(&self) {
        let state = self.driver_state();
        if state.running.get() {
            self.stopped();
            state.running.set(false);
        }
    }

    fn is_running(&self) -> bool {
        self.driver_state().running.get()
    }

    /// Push one tick into the calling thread's scheduler
    fn advance(&self) {
        let timer = UnifiedTimer::instance();
        timer.update_animations_time();
        timer.restart_animation_timer();
    }
}

/// A driver backed by a recurring event loop timer
pub struct DefaultAnimationDriver {
    state: DriverState,
    timer: BasicTimer,
    unified_timer: Weak<UnifiedTimer>,
}

impl DefaultAnimationDriver {
    pub(crate) fn new(unified_timer: Weak<UnifiedTimer>) -> Self {
        Self {
            state: DriverState::new(),
            timer: BasicTimer::new(),
            unified_timer,
        }
    }
}

impl AnimationDriver for DefaultAnimationDriver {
    fn driver_state(&self) -> &DriverState {
        &self.state
    }

    fn started(&self) {
        let interval = self
            .unified_timer
            .upgrade()
            .map_or(16, |timer| timer.timing_interval());
        // The event loop has no idle hook, so a 0ms recurring timer would spin
        let interval = u64::try_from(interval.max(1)).unwrap_or(1);

        let unified_timer = self.unified_timer.clone();
        self.timer.start(interval, move || {
            if let Some(timer) = unified_timer.upgrade() {
                timer.update_animations_time();
                timer.restart_animation_timer();
            }
        });
    }

    fn stopped(&self) {
        self.timer.stop();
    }
}

pub(crate) fn same_driver(a: &Rc<dyn AnimationDriver>, b: &Rc<dyn AnimationDriver>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

/// Make `driver` the tick source of the calling thread's scheduler
///
/// Fails while the current driver is running; the current driver is kept.
pub fn install_driver(driver: Rc<dyn AnimationDriver>) -> Result<()> {
    UnifiedTimer::instance().install_driver(driver)
}

/// Restore the default driver if `driver` is the installed one
pub fn uninstall_driver(driver: &Rc<dyn AnimationDriver>) -> Result<()> {
    match UnifiedTimer::existing() {
        Some(timer) => timer.uninstall_driver(driver),
        None => {
            tracing::warn!("AnimationDriver: trying to uninstall a driver that is not installed");
            Err(AnimationError::DriverNotInstalled)
        }
    }
}

/// Whether `driver` is the calling thread's tick source
pub fn is_driver_installed(driver: &Rc<dyn AnimationDriver>) -> bool {
    UnifiedTimer::existing().is_some_and(|timer| timer.is_driver_installed(driver))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::State;
    use crate::leaf::LeafAnimation;
    use crate::test_support::install_manual_clock;
    use cadence_core::EventLoop;

    #[derive(Default)]
    struct FrameDriver {
        state: DriverState,
        started: Cell<u32>,
        stopped: Cell<u32>,
    }

    impl AnimationDriver for FrameDriver {
        fn driver_state(&self) -> &DriverState {
            &self.state
        }

        fn started(&self) {
            self.started.set(self.started.get() + 1);
        }

        fn stopped(&self) {
            self.stopped.set(self.stopped.get() + 1);
        }
    }

    #[test]
    fn test_start_stop_are_idempotent() {
        let driver = FrameDriver::default();
        driver.start();
        driver.start();
        assert!(driver.is_running());
        assert_eq!(driver.started.get(), 1);

        driver.stop();
        driver.stop();
        assert!(!driver.is_running());
        assert_eq!(driver.stopped.get(), 1);
    }

    #[test]
    fn test_custom_driver_feeds_ticks() {
        let clock = install_manual_clock();
        let driver = Rc::new(FrameDriver::default());
        let handle: Rc<dyn AnimationDriver> = driver.clone();
        install_driver(handle.clone()).unwrap();
        assert!(is_driver_installed(&handle));

        let animation = LeafAnimation::new(100);
        animation.start();
        EventLoop::current().process_events();
        assert!(driver.is_running());
        assert_eq!(driver.started.get(), 1);

        clock.advance(40);
        driver.advance();
        assert_eq!(animation.current_time(), 40);

        clock.advance(60);
        driver.advance();
        assert_eq!(animation.state(), State::Stopped);

        EventLoop::current().process_events();
        assert!(!driver.is_running());
        assert_eq!(driver.stopped.get(), 1);
    }

    #[test]
    fn test_install_rejected_while_running() {
        let _clock = install_manual_clock();
        let first: Rc<dyn AnimationDriver> = Rc::new(FrameDriver::default());
        install_driver(first.clone()).unwrap();

        let animation = LeafAnimation::new(1000);
        animation.start();
        EventLoop::current().process_events();
        assert!(first.is_running());

        let second: Rc<dyn AnimationDriver> = Rc::new(FrameDriver::default());
        assert_eq!(
            install_driver(second.clone()),
            Err(AnimationError::DriverRunning)
        );
        assert!(is_driver_installed(&first));
        assert!(!is_driver_installed(&second));
    }

    #[test]
    fn test_uninstall_restores_default_driver() {
        let _clock = install_manual_clock();
        let custom = Rc::new(FrameDriver::default());
        let handle: Rc<dyn AnimationDriver> = custom.clone();
        install_driver(handle.clone()).unwrap();

        let animation = LeafAnimation::new(1000);
        animation.start();
        EventLoop::current().process_events();
        assert!(custom.is_running());

        uninstall_driver(&handle).unwrap();
        assert!(!custom.is_running());
        assert!(!is_driver_installed(&handle));

        let timer = UnifiedTimer::instance();
        assert!(timer.is_driver_running());
        assert_eq!(
            uninstall_driver(&handle),
            Err(AnimationError::DriverNotInstalled)
        );
    }

    #[test]
    fn test_default_driver_ticks_at_interval() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(1000);
        animation.start();

        let event_loop = EventLoop::current();
        event_loop.run_for(48);
        assert_eq!(animation.current_time(), 48);
        assert_eq!(animation.update_count(), 4);
    }
}
