//! The per-thread animation scheduler
//!
//! One [`UnifiedTimer`] per thread drives every top-level animation from a
//! single clock. Newly started animations wait in a pending queue that is
//! merged on the next zero-delay start/stop timer firing, so registering from
//! inside a tick never disturbs the pass in progress. While only pause
//! animations run, the continuous driver is replaced by a sparse timer that
//! fires when the nearest pause animation ends.

use crate::animation::{Animation, AnimationKind, Direction};
use crate::config::TimerConfig;
use crate::driver::{same_driver, AnimationDriver, DefaultAnimationDriver};
use crate::error::{AnimationError, Result};
use cadence_core::{BasicTimer, ElapsedTimer, EventLoop};
use std::cell::{Cell, OnceCell, RefCell};
use std::rc::{Rc, Weak};

thread_local! {
    static INSTANCE: OnceCell<Rc<UnifiedTimer>> = const { OnceCell::new() };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimerSource {
    StartStop,
    Animation,
}

/// Scheduler state for one thread
pub struct UnifiedTimer {
    /// Top-level animations being ticked, in registration order
    animations: RefCell<Vec<Animation>>,
    animations_to_start: RefCell<Vec<Animation>>,
    running_pause_animations: RefCell<Vec<Animation>>,
    running_leaf_animations: Cell<i32>,
    current_animation_idx: Cell<isize>,

    time: RefCell<ElapsedTimer>,
    last_tick: Cell<i64>,
    timing_interval: Cell<i32>,
    inside_tick: Cell<bool>,
    is_pause_timer_active: Cell<bool>,
    consistent_timing: Cell<bool>,
    slow_mode: Cell<bool>,
    slowdown_factor: Cell<f32>,

    start_stop_timer: BasicTimer,
    /// Sparse timer used while only pause animations run
    animation_timer: BasicTimer,

    driver: RefCell<Rc<dyn AnimationDriver>>,
    default_driver: Rc<DefaultAnimationDriver>,
    this: Weak<UnifiedTimer>,
}

impl UnifiedTimer {
    fn new() -> Rc<Self> {
        let defaults = TimerConfig::default();
        Rc::new_cyclic(|this: &Weak<UnifiedTimer>| {
            let default_driver = Rc::new(DefaultAnimationDriver::new(this.clone()));
            let driver: Rc<dyn AnimationDriver> = default_driver.clone();
            Self {
                animations: RefCell::new(Vec::new()),
                animations_to_start: RefCell::new(Vec::new()),
                running_pause_animations: RefCell::new(Vec::new()),
                running_leaf_animations: Cell::new(0),
                current_animation_idx: Cell::new(0),
                time: RefCell::new(ElapsedTimer::new()),
                last_tick: Cell::new(0),
                timing_interval: Cell::new(defaults.timing_interval),
                inside_tick: Cell::new(false),
                is_pause_timer_active: Cell::new(false),
                consistent_timing: Cell::new(defaults.consistent_timing),
                slow_mode: Cell::new(defaults.slow_mode),
                slowdown_factor: Cell::new(defaults.slowdown_factor),
                start_stop_timer: BasicTimer::new(),
                animation_timer: BasicTimer::new(),
                driver: RefCell::new(driver),
                default_driver,
                this: this.clone(),
            }
        })
    }

    /// The calling thread's scheduler, created on first use
    pub fn instance() -> Rc<UnifiedTimer> {
        INSTANCE.with(|slot| Rc::clone(slot.get_or_init(UnifiedTimer::new)))
    }

    /// The calling thread's scheduler if one exists
    ///
    /// Never creates one. Returns `None` during thread teardown.
    pub fn existing() -> Option<Rc<UnifiedTimer>> {
        INSTANCE.try_with(|slot| slot.get().cloned()).ok().flatten()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Record that `animation` entered Running
    pub(crate) fn register_animation(animation: &Animation, is_top_level: bool) {
        let timer = Self::instance();
        timer.register_running_animation(animation);

        if !is_top_level {
            return;
        }
        debug_assert!(
            !animation.has_registered_timer(),
            "UnifiedTimer: animation registered twice"
        );
        if animation.has_registered_timer() {
            tracing::error!("UnifiedTimer: animation registered twice, ignoring");
            return;
        }
        animation.set_has_registered_timer(true);
        timer.animations_to_start.borrow_mut().push(animation.clone());
        tracing::trace!(
            "UnifiedTimer: queued animation, {} pending",
            timer.animations_to_start.borrow().len()
        );
        if !timer.start_stop_timer.is_active() {
            timer.arm_start_stop_timer();
        }
    }

    /// Record that `animation` left Running
    pub(crate) fn unregister_animation(animation: &Animation) {
        let Some(timer) = Self::existing() else {
            animation.set_has_registered_timer(false);
            return;
        };
        timer.unregister_running_animation(animation);

        if !animation.has_registered_timer() {
            return;
        }

        let position = timer.animations.borrow().iter().position(|a| a == animation);
        if let Some(idx) = position {
            let removed = timer.animations.borrow_mut().remove(idx);
            drop(removed);

            // Keep an in-progress tick from skipping the next animation
            let idx = idx as isize;
            if idx <= timer.current_animation_idx.get() {
                timer
                    .current_animation_idx
                    .set(timer.current_animation_idx.get() - 1);
            }

            if timer.animations.borrow().is_empty() && !timer.start_stop_timer.is_active() {
                timer.arm_start_stop_timer();
            }
        } else {
            let removed = {
                let mut pending = timer.animations_to_start.borrow_mut();
                pending
                    .iter()
                    .position(|a| a == animation)
                    .map(|idx| pending.remove(idx))
            };
            drop(removed);
        }
        tracing::trace!("UnifiedTimer: unregistered animation");

        animation.set_has_registered_timer(false);
    }

    /// Bookkeeping for an animation dropped while Running
    ///
    /// Only non-top-level leaves can be dropped that way; every other running
    /// animation is held by the scheduler.
    pub(crate) fn unregister_dropped(kind: AnimationKind) {
        if kind != AnimationKind::Leaf {
            return;
        }
        if let Some(timer) = Self::existing() {
            timer.decrement_leaf_count();
        }
    }

    fn register_running_animation(&self, animation: &Animation) {
        match animation.kind() {
            AnimationKind::Group => {}
            AnimationKind::Pause => self
                .running_pause_animations
                .borrow_mut()
                .push(animation.clone()),
            AnimationKind::Leaf => self
                .running_leaf_animations
                .set(self.running_leaf_animations.get() + 1),
        }
    }

    fn unregister_running_animation(&self, animation: &Animation) {
        match animation.kind() {
            AnimationKind::Group => {}
            AnimationKind::Pause => {
                let removed = {
                    let mut pauses = self.running_pause_animations.borrow_mut();
                    pauses
                        .iter()
                        .position(|a| a == animation)
                        .map(|idx| pauses.remove(idx))
                };
                drop(removed);
            }
            AnimationKind::Leaf => self.decrement_leaf_count(),
        }
    }

    fn decrement_leaf_count(&self) {
        let count = self.running_leaf_animations.get() - 1;
        debug_assert!(
            count >= 0,
            "UnifiedTimer: running leaf animation count went negative"
        );
        if count < 0 {
            tracing::error!("UnifiedTimer: running leaf animation count went negative");
            self.running_leaf_animations.set(0);
        } else {
            self.running_leaf_animations.set(count);
        }
    }

    // =========================================================================
    // Ticking
    // =========================================================================

    /// Advance every top-level animation by the time since the last tick
    pub fn update_animations_time(&self) {
        // A pause animation's time update can ask for a nested recompute
        if self.inside_tick.get() {
            return;
        }

        let total_elapsed = self.time.borrow().elapsed(EventLoop::current().now_ms());
        let mut delta = if self.consistent_timing.get() && !self.is_pause_timer_active.get() {
            i64::from(self.timing_interval.get())
        } else {
            total_elapsed - self.last_tick.get()
        };
        if self.slow_mode.get() {
            let factor = self.slowdown_factor.get();
            delta = if factor > 0.0 {
                (delta as f32 / factor).round() as i64
            } else {
                0
            };
        }
        self.last_tick.set(total_elapsed);

        if delta == 0 {
            return;
        }
        tracing::trace!("UnifiedTimer: tick at {}ms, delta {}ms", total_elapsed, delta);

        let delta = delta.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        self.inside_tick.set(true);
        self.current_animation_idx.set(0);
        loop {
            let Ok(idx) = usize::try_from(self.current_animation_idx.get()) else {
                break;
            };
            let Some(animation) = self.animations.borrow().get(idx).cloned() else {
                break;
            };
            let elapsed = match animation.direction() {
                Direction::Forward => animation.current_time().saturating_add(delta),
                Direction::Backward => animation.current_time().saturating_sub(delta),
            };
            animation.set_current_time(elapsed);
            self.current_animation_idx
                .set(self.current_animation_idx.get() + 1);
        }
        self.inside_tick.set(false);
        self.current_animation_idx.set(0);
    }

    /// Pick between the continuous driver, the sparse pause timer, or neither
    pub fn restart_animation_timer(&self) {
        let driver = self.current_driver();
        let has_pauses = !self.running_pause_animations.borrow().is_empty();

        if self.running_leaf_animations.get() == 0 && has_pauses {
            let closest = self.closest_pause_animation_time_to_finish().max(0);
            driver.stop();
            self.start_animation_timer(u64::try_from(closest).unwrap_or(0));
            if !self.is_pause_timer_active.get() {
                tracing::debug!("UnifiedTimer: sparse mode, next deadline in {}ms", closest);
            }
            self.is_pause_timer_active.set(true);
        } else if !driver.is_running() || self.is_pause_timer_active.get() {
            tracing::debug!("UnifiedTimer: continuous mode");
            self.animation_timer.stop();
            driver.start();
            self.is_pause_timer_active.set(false);
        } else if self.running_leaf_animations.get() == 0 {
            tracing::debug!("UnifiedTimer: stopping driver");
            driver.stop();
        }
    }

    fn closest_pause_animation_time_to_finish(&self) -> i32 {
        let pauses = self.running_pause_animations.borrow().clone();
        pauses
            .iter()
            .map(|animation| match animation.direction() {
                Direction::Forward => animation.duration() - animation.current_loop_time(),
                Direction::Backward => animation.current_loop_time(),
            })
            .min()
            .unwrap_or(i32::MAX)
    }

    fn timer_event(&self, source: TimerSource) {
        // Under consistent timing the start/stop work always comes first
        if source == TimerSource::StartStop
            || (self.consistent_timing.get() && self.start_stop_timer.is_active())
        {
            self.start_stop_timer.stop();

            let pending = std::mem::take(&mut *self.animations_to_start.borrow_mut());
            self.animations.borrow_mut().extend(pending);

            if self.animations.borrow().is_empty() {
                tracing::debug!("UnifiedTimer: idle");
                self.animation_timer.stop();
                self.current_driver().stop();
                self.is_pause_timer_active.set(false);
                self.time.borrow_mut().invalidate();
            } else {
                self.restart_animation_timer();
                if !self.time.borrow().is_valid() {
                    self.last_tick.set(0);
                    let now = EventLoop::current().now_ms();
                    self.time.borrow_mut().start(now);
                }
            }
        }

        if source == TimerSource::Animation {
            self.update_animations_time();
            self.restart_animation_timer();
        }
    }

    fn arm_start_stop_timer(&self) {
        let this = self.this.clone();
        self.start_stop_timer.start(0, move || {
            if let Some(timer) = this.upgrade() {
                timer.timer_event(TimerSource::StartStop);
            }
        });
    }

    fn start_animation_timer(&self, interval_ms: u64) {
        let this = self.this.clone();
        self.animation_timer.start(interval_ms, move || {
            if let Some(timer) = this.upgrade() {
                timer.timer_event(TimerSource::Animation);
            }
        });
    }

    /// Bring animation time up to date before a state change
    ///
    /// Only needed in sparse mode, where ticks are rare. Never creates a
    /// scheduler.
    pub fn ensure_timer_update() {
        if let Some(timer) = Self::existing() {
            if timer.is_pause_timer_active.get() {
                timer.update_animations_time();
            }
        }
    }

    /// Re-run driver arbitration, e.g. after a pause animation's deadline moved
    pub fn update_animation_timer() {
        if let Some(timer) = Self::existing() {
            timer.restart_animation_timer();
        }
    }

    // =========================================================================
    // Driver
    // =========================================================================

    fn current_driver(&self) -> Rc<dyn AnimationDriver> {
        Rc::clone(&self.driver.borrow())
    }

    pub fn install_driver(&self, driver: Rc<dyn AnimationDriver>) -> Result<()> {
        if self.current_driver().is_running() {
            tracing::warn!(
                "UnifiedTimer: cannot change animation driver while animations are running"
            );
            return Err(AnimationError::DriverRunning);
        }
        *self.driver.borrow_mut() = driver;
        tracing::debug!("UnifiedTimer: installed animation driver");
        Ok(())
    }

    pub fn uninstall_driver(&self, driver: &Rc<dyn AnimationDriver>) -> Result<()> {
        let current = self.current_driver();
        if !same_driver(&current, driver) {
            tracing::warn!("UnifiedTimer: trying to uninstall a driver that is not installed");
            return Err(AnimationError::DriverNotInstalled);
        }

        let running = current.is_running();
        if running {
            current.stop();
        }
        let default_driver: Rc<dyn AnimationDriver> = self.default_driver.clone();
        *self.driver.borrow_mut() = Rc::clone(&default_driver);
        if running {
            default_driver.start();
        }
        tracing::debug!("UnifiedTimer: restored default animation driver");
        Ok(())
    }

    pub fn is_driver_installed(&self, driver: &Rc<dyn AnimationDriver>) -> bool {
        same_driver(&self.driver.borrow(), driver)
    }

    pub fn is_driver_running(&self) -> bool {
        self.current_driver().is_running()
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn timing_interval(&self) -> i32 {
        self.timing_interval.get()
    }

    /// Change the tick interval; a running continuous driver restarts at once
    pub fn set_timing_interval(&self, interval: i32) {
        self.timing_interval.set(interval);
        let driver = self.current_driver();
        if driver.is_running() && !self.is_pause_timer_active.get() {
            driver.stop();
            driver.start();
        }
    }

    pub fn is_consistent_timing(&self) -> bool {
        self.consistent_timing.get()
    }

    pub fn set_consistent_timing(&self, enabled: bool) {
        self.consistent_timing.set(enabled);
    }

    pub fn is_slow_mode(&self) -> bool {
        self.slow_mode.get()
    }

    pub fn set_slow_mode(&self, enabled: bool) {
        self.slow_mode.set(enabled);
    }

    pub fn slowdown_factor(&self) -> f32 {
        self.slowdown_factor.get()
    }

    pub fn set_slowdown_factor(&self, factor: f32) {
        self.slowdown_factor.set(factor);
    }

    /// Apply every option in `config`
    pub fn configure(&self, config: &TimerConfig) {
        self.set_consistent_timing(config.consistent_timing);
        self.set_slow_mode(config.slow_mode);
        self.set_slowdown_factor(config.slowdown_factor);
        self.set_timing_interval(config.timing_interval);
    }

    /// Snapshot of the current options
    pub fn config(&self) -> TimerConfig {
        TimerConfig {
            timing_interval: self.timing_interval(),
            consistent_timing: self.is_consistent_timing(),
            slow_mode: self.is_slow_mode(),
            slowdown_factor: self.slowdown_factor(),
        }
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Top-level animations currently ticked
    pub fn running_animation_count(&self) -> usize {
        self.animations.borrow().len()
    }

    /// Top-level animations waiting for the next start/stop pass
    pub fn pending_animation_count(&self) -> usize {
        self.animations_to_start.borrow().len()
    }

    pub fn running_leaf_animations(&self) -> i32 {
        self.running_leaf_animations.get()
    }

    pub fn running_pause_animation_count(&self) -> usize {
        self.running_pause_animations.borrow().len()
    }

    pub fn is_pause_timer_active(&self) -> bool {
        self.is_pause_timer_active.get()
    }

    pub fn is_start_stop_timer_active(&self) -> bool {
        self.start_stop_timer.is_active()
    }

    pub fn is_animation_timer_active(&self) -> bool {
        self.animation_timer.is_active()
    }

    /// Reference clock reading at the last tick
    pub fn last_tick(&self) -> i64 {
        self.last_tick.get()
    }

    pub fn is_clock_valid(&self) -> bool {
        self.time.borrow().is_valid()
    }
}
