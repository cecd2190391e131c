//! Animation state machine
//!
//! [`Animation`] is the handle every animation kind shares. It owns the
//! Stopped / Paused / Running state machine, the loop arithmetic, and the
//! registration with the thread's [`UnifiedTimer`]. What an animation *does*
//! with its time is supplied by a [`Drivable`] implementation (see
//! [`LeafAnimation`](crate::LeafAnimation),
//! [`PauseAnimation`](crate::PauseAnimation) and
//! [`ParallelAnimationGroup`](crate::ParallelAnimationGroup)).
//!
//! Every mutable field is a `Cell`, and no borrow is held across a call into
//! a hook or a listener. Hooks and listeners may therefore call `start`,
//! `stop`, `pause` or `set_current_time` on any animation, including the one
//! notifying them.
//!
//! # Example
//!
//! ```rust
//! use cadence_animation::{LeafAnimation, State};
//!
//! let fade = LeafAnimation::new(100);
//! fade.set_loop_count(3);
//! fade.start();
//! assert_eq!(fade.state(), State::Running);
//!
//! fade.set_current_time(250);
//! assert_eq!(fade.current_loop(), 2);
//! assert_eq!(fade.current_loop_time(), 50);
//!
//! fade.set_current_time(300);
//! assert_eq!(fade.state(), State::Stopped);
//! ```

use crate::unified_timer::UnifiedTimer;
use cadence_core::{EventLoop, ListenerId, Notifier};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Playback state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Stopped,
    Paused,
    Running,
}

/// Direction time advances in while running
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// What happens to a started animation once it stops
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// The animation lives as long as its handles
    #[default]
    KeepWhenStopped,
    /// The animation keeps itself alive while it plays and is dropped on the
    /// event loop pass after it stops
    DeleteWhenStopped,
}

/// Bookkeeping category the scheduler uses to pick a driver mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AnimationKind {
    /// Produces values; forces continuous ticking while running
    #[default]
    Leaf,
    /// Delay only; lets the scheduler sleep until its deadline
    Pause,
    /// Composite; never drives the clock itself, only its children do
    Group,
}

/// The contract an animation subtype implements
///
/// The state machine calls these hooks; implementations never change state
/// directly except by calling methods on the `animation` handle they are
/// given.
pub trait Drivable {
    fn kind(&self) -> AnimationKind {
        AnimationKind::Leaf
    }

    /// Length of one loop in milliseconds, or -1 when indeterminate
    fn duration(&self) -> i32;

    /// Called with the in-loop time after every time change
    fn update_current_time(&self, animation: &Animation, current_time: i32);

    /// Called after a state change, before listeners are notified
    fn update_state(&self, _animation: &Animation, _new_state: State, _old_state: State) {}

    /// Called after the direction changed
    fn update_direction(&self, _animation: &Animation, _direction: Direction) {}

    /// Groups detach `child` from their children; other kinds ignore this
    fn take_child(&self, _group: &Animation, _child: &Animation) -> bool {
        false
    }
}

#[derive(Default)]
struct AnimationSignals {
    state_changed: Notifier<(State, State)>,
    current_loop_changed: Notifier<i32>,
    direction_changed: Notifier<Direction>,
    finished: Notifier<()>,
}

pub(crate) struct AnimationInner {
    state: Cell<State>,
    direction: Cell<Direction>,
    loop_count: Cell<i32>,
    current_loop: Cell<i32>,
    /// Time within the current loop
    current_time: Cell<i32>,
    total_current_time: Cell<i32>,
    has_registered_timer: Cell<bool>,
    deletion_policy: Cell<DeletionPolicy>,
    keep_alive: RefCell<Option<Animation>>,
    group: RefCell<Weak<AnimationInner>>,
    kind: AnimationKind,
    signals: AnimationSignals,
    behavior: Box<dyn Drivable>,
}

/// A shared handle to one animation
///
/// Clones refer to the same animation and compare equal.
#[derive(Clone)]
pub struct Animation {
    inner: Rc<AnimationInner>,
}

/// A non-owning [`Animation`] handle
#[derive(Clone, Default)]
pub struct WeakAnimation {
    inner: Weak<AnimationInner>,
}

impl WeakAnimation {
    pub fn upgrade(&self) -> Option<Animation> {
        self.inner.upgrade().map(|inner| Animation { inner })
    }
}

impl Animation {
    /// Wrap a subtype implementation in a new, stopped animation
    pub fn new<D>(behavior: D) -> Self
    where
        D: Drivable + 'static,
    {
        let kind = behavior.kind();
        Self {
            inner: Rc::new(AnimationInner {
                state: Cell::new(State::Stopped),
                direction: Cell::new(Direction::Forward),
                loop_count: Cell::new(1),
                current_loop: Cell::new(0),
                current_time: Cell::new(0),
                total_current_time: Cell::new(0),
                has_registered_timer: Cell::new(false),
                deletion_policy: Cell::new(DeletionPolicy::KeepWhenStopped),
                keep_alive: RefCell::new(None),
                group: RefCell::new(Weak::new()),
                kind,
                signals: AnimationSignals::default(),
                behavior: Box::new(behavior),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakAnimation {
        WeakAnimation {
            inner: Rc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn state(&self) -> State {
        self.inner.state.get()
    }

    /// Policy of the most recent start
    pub fn deletion_policy(&self) -> DeletionPolicy {
        self.inner.deletion_policy.get()
    }

    pub fn kind(&self) -> AnimationKind {
        self.inner.kind
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction.get()
    }

    /// Change playback direction
    ///
    /// A stopped animation is moved to the matching end: the last loop's end
    /// for `Backward`, the very start for `Forward`.
    pub fn set_direction(&self, direction: Direction) {
        let inner = &self.inner;
        if inner.direction.get() == direction {
            return;
        }

        if inner.state.get() == State::Stopped {
            if direction == Direction::Backward {
                inner.current_time.set(self.duration());
                inner.current_loop.set(inner.loop_count.get() - 1);
            } else {
                inner.current_time.set(0);
                inner.current_loop.set(0);
            }
        }

        // Time must be brought up to date with the old direction first
        if inner.has_registered_timer.get() {
            UnifiedTimer::ensure_timer_update();
        }

        inner.direction.set(direction);
        inner.behavior.update_direction(self, direction);

        // A pause animation's deadline depends on its direction
        if inner.has_registered_timer.get() {
            UnifiedTimer::update_animation_timer();
        }

        inner.signals.direction_changed.emit(&direction);
    }

    /// Number of loops; -1 loops forever and 0 never runs
    pub fn loop_count(&self) -> i32 {
        self.inner.loop_count.get()
    }

    pub fn set_loop_count(&self, loop_count: i32) {
        self.inner.loop_count.set(loop_count);
    }

    /// Zero-based index of the loop in progress
    pub fn current_loop(&self) -> i32 {
        self.inner.current_loop.get()
    }

    /// Time within the current loop
    pub fn current_loop_time(&self) -> i32 {
        self.inner.current_time.get()
    }

    /// Total time since the start, across all loops
    pub fn current_time(&self) -> i32 {
        self.inner.total_current_time.get()
    }

    pub fn duration(&self) -> i32 {
        self.inner.behavior.duration()
    }

    /// Duration of all loops together, -1 when infinite or indeterminate
    pub fn total_duration(&self) -> i32 {
        let duration = self.duration();
        if duration <= 0 {
            return duration;
        }
        let loop_count = self.loop_count();
        if loop_count < 0 {
            return -1;
        }
        duration.saturating_mul(loop_count)
    }

    /// The group this animation belongs to, if it is still alive
    pub fn group(&self) -> Option<Animation> {
        self.inner
            .group
            .borrow()
            .upgrade()
            .map(|inner| Animation { inner })
    }

    /// Whether the scheduler drives this animation directly
    ///
    /// True without a group, or while the group is stopped.
    pub fn is_top_level(&self) -> bool {
        self.group()
            .map_or(true, |group| group.state() == State::Stopped)
    }

    pub(crate) fn set_group(&self, group: Option<&Animation>) {
        *self.inner.group.borrow_mut() = group.map_or_else(Weak::new, |g| Rc::downgrade(&g.inner));
    }

    /// Leave the current group, if any
    pub(crate) fn detach_from_group(&self) {
        if let Some(group) = self.group() {
            group.inner.behavior.take_child(&group, self);
        }
        self.set_group(None);
    }

    pub(crate) fn has_registered_timer(&self) -> bool {
        self.inner.has_registered_timer.get()
    }

    pub(crate) fn set_has_registered_timer(&self, registered: bool) {
        self.inner.has_registered_timer.set(registered);
    }

    // =========================================================================
    // Control
    // =========================================================================

    /// Start playing; no-op when already running
    pub fn start(&self) {
        self.start_with_policy(DeletionPolicy::KeepWhenStopped);
    }

    pub fn start_with_policy(&self, policy: DeletionPolicy) {
        if self.state() == State::Running {
            return;
        }
        self.inner.deletion_policy.set(policy);
        self.set_state(State::Running);

        if policy == DeletionPolicy::DeleteWhenStopped && self.state() != State::Stopped {
            *self.inner.keep_alive.borrow_mut() = Some(self.clone());
        } else {
            // Drop any self-reference left by an earlier DeleteWhenStopped start
            let released = self.inner.keep_alive.borrow_mut().take();
            drop(released);
        }
    }

    pub fn pause(&self) {
        if self.state() == State::Stopped {
            tracing::warn!("Animation::pause: cannot pause a stopped animation");
            return;
        }
        self.set_state(State::Paused);
    }

    pub fn resume(&self) {
        if self.state() != State::Paused {
            tracing::warn!("Animation::resume: cannot resume an animation that is not paused");
            return;
        }
        self.set_state(State::Running);
    }

    pub fn set_paused(&self, paused: bool) {
        if paused {
            self.pause();
        } else {
            self.resume();
        }
    }

    /// Stop playing; no-op when already stopped
    pub fn stop(&self) {
        if self.state() == State::Stopped {
            return;
        }
        self.set_state(State::Stopped);
    }

    /// Move to `msecs` of total time
    ///
    /// The time is clamped to `[0, total_duration]`. When the clamped time
    /// reaches the end in the current direction the animation stops itself.
    pub fn set_current_time(&self, msecs: i32) {
        let inner = &self.inner;
        let mut msecs = msecs.max(0);

        let duration = self.duration();
        let loop_count = inner.loop_count.get();
        let total_duration = if duration <= 0 {
            duration
        } else if loop_count < 0 {
            -1
        } else {
            duration.saturating_mul(loop_count)
        };
        if total_duration != -1 {
            msecs = msecs.min(total_duration);
        }
        inner.total_current_time.set(msecs);

        let old_loop = inner.current_loop.get();
        let mut current_loop = if duration <= 0 { 0 } else { msecs / duration };
        let current_time;
        if current_loop == loop_count {
            // Exactly at the end: report the last valid loop, fully played
            current_time = duration.max(0);
            current_loop = (loop_count - 1).max(0);
        } else if inner.direction.get() == Direction::Forward {
            current_time = if duration <= 0 {
                msecs
            } else {
                msecs % duration
            };
        } else {
            current_time = if duration <= 0 {
                msecs
            } else {
                (msecs - 1) % duration + 1
            };
            if current_time == duration {
                current_loop -= 1;
            }
        }
        inner.current_time.set(current_time);
        inner.current_loop.set(current_loop);

        inner.behavior.update_current_time(self, current_time);
        if current_loop != old_loop {
            inner.signals.current_loop_changed.emit(&current_loop);
        }

        // Time-driven animations are responsible for stopping at their end
        let total = inner.total_current_time.get();
        let at_end = match inner.direction.get() {
            Direction::Forward => total == total_duration,
            Direction::Backward => total == 0,
        };
        if at_end {
            self.stop();
        }
    }

    fn set_state(&self, new_state: State) {
        let inner = &self.inner;
        if inner.state.get() == new_state {
            return;
        }
        if inner.loop_count.get() == 0 {
            return;
        }

        let old_state = inner.state.get();
        let old_current_time = inner.current_time.get();
        let old_current_loop = inner.current_loop.get();
        let old_direction = inner.direction.get();

        // Rewind when leaving Stopped, without going through
        // set_current_time so no value or state change happens yet
        if old_state == State::Stopped && new_state != State::Stopped {
            let rewound = if inner.direction.get() == Direction::Forward {
                0
            } else if inner.loop_count.get() == -1 {
                self.duration()
            } else {
                self.total_duration()
            };
            inner.total_current_time.set(rewound);
            inner.current_time.set(rewound);
        }

        inner.state.set(new_state);

        // (Un)registration always happens before the hook so the scheduler
        // is consistent when subtype code runs
        let is_top_level = self.is_top_level();
        if old_state == State::Running {
            if new_state == State::Paused && inner.has_registered_timer.get() {
                UnifiedTimer::ensure_timer_update();
            }
            UnifiedTimer::unregister_animation(self);
        } else if new_state == State::Running {
            UnifiedTimer::register_animation(self, is_top_level);
        }

        inner.behavior.update_state(self, new_state, old_state);
        if inner.state.get() != new_state {
            return;
        }

        inner.signals.state_changed.emit(&(new_state, old_state));
        if inner.state.get() != new_state {
            return;
        }

        match new_state {
            State::Paused => {}
            State::Running => {
                // Make the value correct right away instead of on the next tick
                if old_state == State::Stopped && is_top_level {
                    UnifiedTimer::ensure_timer_update();
                    self.set_current_time(inner.total_current_time.get());
                }
            }
            State::Stopped => {
                let duration = self.duration();
                let loop_count = inner.loop_count.get();

                let handle = inner.keep_alive.borrow_mut().take();
                if let Some(handle) = handle {
                    EventLoop::current().delete_later(handle);
                }

                let ran_to_end = duration == -1
                    || loop_count < 0
                    || (old_direction == Direction::Forward
                        && old_current_time.saturating_mul(old_current_loop + 1)
                            == duration.saturating_mul(loop_count))
                    || (old_direction == Direction::Backward && old_current_time == 0);
                if ran_to_end {
                    inner.signals.finished.emit(&());
                }
            }
        }
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    /// Listen for state changes; the listener receives `(new, old)`
    pub fn on_state_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(State, State) + 'static,
    {
        self.inner
            .signals
            .state_changed
            .connect(move |&(new_state, old_state)| listener(new_state, old_state))
    }

    pub fn on_current_loop_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(i32) + 'static,
    {
        self.inner
            .signals
            .current_loop_changed
            .connect(move |&current_loop| listener(current_loop))
    }

    pub fn on_direction_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(Direction) + 'static,
    {
        self.inner
            .signals
            .direction_changed
            .connect(move |&direction| listener(direction))
    }

    /// Listen for the animation running to its natural end
    pub fn on_finished<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + 'static,
    {
        self.inner.signals.finished.connect(move |_| listener())
    }

    pub fn disconnect_state_changed(&self, id: ListenerId) -> bool {
        self.inner.signals.state_changed.disconnect(id)
    }

    pub fn disconnect_current_loop_changed(&self, id: ListenerId) -> bool {
        self.inner.signals.current_loop_changed.disconnect(id)
    }

    pub fn disconnect_direction_changed(&self, id: ListenerId) -> bool {
        self.inner.signals.direction_changed.disconnect(id)
    }

    pub fn disconnect_finished(&self, id: ListenerId) -> bool {
        self.inner.signals.finished.disconnect(id)
    }
}

impl PartialEq for Animation {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Animation {}

impl fmt::Debug for Animation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Animation")
            .field("kind", &self.kind())
            .field("state", &self.state())
            .field("direction", &self.direction())
            .field("current_time", &self.current_time())
            .field("current_loop", &self.current_loop())
            .field("loop_count", &self.loop_count())
            .finish()
    }
}

impl Drop for AnimationInner {
    fn drop(&mut self) {
        let old_state = self.state.get();
        if old_state == State::Stopped {
            return;
        }
        // No handle exists any more, so hooks cannot run; only the
        // notification and the scheduler bookkeeping are left to do.
        self.state.set(State::Stopped);
        self.signals.state_changed.emit(&(State::Stopped, old_state));
        if old_state == State::Running {
            UnifiedTimer::unregister_dropped(self.kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leaf::LeafAnimation;
    use crate::test_support::install_manual_clock;

    fn count_finished(animation: &Animation) -> Rc<Cell<u32>> {
        let finished = Rc::new(Cell::new(0));
        let counter = finished.clone();
        animation.on_finished(move || counter.set(counter.get() + 1));
        finished
    }

    #[test]
    fn test_three_loop_scenario() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(3);
        let finished = count_finished(&animation);

        animation.start();
        assert_eq!(animation.state(), State::Running);
        assert_eq!(animation.current_time(), 0);

        animation.set_current_time(250);
        assert_eq!(animation.current_loop(), 2);
        assert_eq!(animation.current_loop_time(), 50);

        animation.set_current_time(300);
        assert_eq!(animation.state(), State::Stopped);
        assert_eq!(animation.current_loop(), 2);
        assert_eq!(animation.current_loop_time(), 100);
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_finished_only_on_natural_end() {
        let _clock = install_manual_clock();

        let completed = LeafAnimation::new(1000);
        completed.set_loop_count(2);
        let completed_finished = count_finished(&completed);
        completed.start();
        completed.set_current_time(2000);
        assert_eq!(completed.state(), State::Stopped);
        assert_eq!(completed_finished.get(), 1);

        let interrupted = LeafAnimation::new(1000);
        interrupted.set_loop_count(2);
        let interrupted_finished = count_finished(&interrupted);
        interrupted.start();
        interrupted.set_current_time(500);
        interrupted.stop();
        assert_eq!(interrupted.state(), State::Stopped);
        assert_eq!(interrupted_finished.get(), 0);
    }

    #[test]
    fn test_stop_on_stopped_is_silent() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        let changes = Rc::new(Cell::new(0));
        let counter = changes.clone();
        animation.on_state_changed(move |_, _| counter.set(counter.get() + 1));
        let finished = count_finished(&animation);

        animation.stop();
        animation.stop();

        assert_eq!(animation.state(), State::Stopped);
        assert_eq!(changes.get(), 0);
        assert_eq!(finished.get(), 0);
        assert!(UnifiedTimer::existing().is_none());
    }

    #[test]
    fn test_stop_after_stop_leaves_scheduler_untouched() {
        let _clock = install_manual_clock();
        let other = LeafAnimation::new(1000);
        other.start();

        let animation = LeafAnimation::new(100);
        animation.start();
        animation.stop();

        let timer = UnifiedTimer::instance();
        let pending = timer.pending_animation_count();
        let leaves = timer.running_leaf_animations();

        animation.stop();
        assert_eq!(timer.pending_animation_count(), pending);
        assert_eq!(timer.running_leaf_animations(), leaves);
        assert_eq!(leaves, 1);
    }

    #[test]
    fn test_loop_arithmetic_round_trip() {
        for direction in [Direction::Forward, Direction::Backward] {
            for duration in [1, 7, 100] {
                for loop_count in [1, 3] {
                    let animation = LeafAnimation::new(duration);
                    animation.set_loop_count(loop_count);
                    animation.set_direction(direction);

                    for msecs in 0..=duration * loop_count {
                        animation.set_current_time(msecs);
                        let loop_index = animation.current_loop();
                        let in_loop = animation.current_loop_time();

                        if msecs == duration * loop_count {
                            assert_eq!(loop_index, loop_count - 1);
                            assert_eq!(in_loop, duration);
                        }
                        assert_eq!(
                            loop_index * duration + in_loop,
                            msecs,
                            "{direction:?} duration={duration} loops={loop_count} msecs={msecs}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_set_current_time_clamps() {
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(2);

        animation.set_current_time(-50);
        assert_eq!(animation.current_time(), 0);

        animation.set_current_time(10_000);
        assert_eq!(animation.current_time(), 200);
        assert_eq!(animation.current_loop(), 1);
        assert_eq!(animation.current_loop_time(), 100);
    }

    #[test]
    fn test_indeterminate_duration_never_loops() {
        let animation = LeafAnimation::new(-1);
        animation.set_loop_count(5);
        animation.set_current_time(12_345);
        assert_eq!(animation.current_time(), 12_345);
        assert_eq!(animation.current_loop(), 0);
        assert_eq!(animation.current_loop_time(), 12_345);
        assert_eq!(animation.total_duration(), -1);
    }

    #[test]
    fn test_indeterminate_duration_finishes_on_stop() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(-1);
        let finished = count_finished(&animation);
        animation.start();
        animation.set_current_time(400);
        animation.stop();
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_zero_loop_count_is_inert() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(0);
        animation.start();
        assert_eq!(animation.state(), State::Stopped);
        assert!(UnifiedTimer::existing().is_none());
    }

    #[test]
    fn test_pause_and_resume_reject_wrong_state() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);

        animation.pause();
        assert_eq!(animation.state(), State::Stopped);

        animation.start();
        animation.resume();
        assert_eq!(animation.state(), State::Running);

        animation.set_paused(true);
        assert_eq!(animation.state(), State::Paused);
        animation.set_paused(false);
        assert_eq!(animation.state(), State::Running);
    }

    #[test]
    fn test_state_changed_reports_new_then_old() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        animation.on_state_changed(move |new_state, old_state| {
            sink.borrow_mut().push((new_state, old_state))
        });

        animation.start();
        animation.pause();
        animation.stop();

        assert_eq!(
            *log.borrow(),
            vec![
                (State::Running, State::Stopped),
                (State::Paused, State::Running),
                (State::Stopped, State::Paused),
            ]
        );
    }

    #[test]
    fn test_reentrant_stop_abandons_transition() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        let handle = animation.downgrade();
        animation.on_state_changed(move |new_state, _| {
            if new_state == State::Running {
                if let Some(animation) = handle.upgrade() {
                    animation.stop();
                }
            }
        });

        animation.start();
        assert_eq!(animation.state(), State::Stopped);
        // The start-up replay of the current time was abandoned
        assert_eq!(animation.update_count(), 0);

        let timer = UnifiedTimer::instance();
        assert_eq!(timer.running_leaf_animations(), 0);
        assert_eq!(timer.pending_animation_count(), 0);
        assert!(!animation.has_registered_timer());
    }

    #[test]
    fn test_start_replays_current_time() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.start();
        assert_eq!(animation.update_count(), 1);
    }

    #[test]
    fn test_backward_playback_finishes_at_zero() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(2);
        animation.set_direction(Direction::Backward);
        let finished = count_finished(&animation);

        animation.start();
        assert_eq!(animation.current_time(), 200);
        assert_eq!(animation.current_loop(), 1);
        assert_eq!(animation.current_loop_time(), 100);

        animation.set_current_time(150);
        assert_eq!(animation.current_loop(), 1);
        assert_eq!(animation.current_loop_time(), 50);

        animation.set_current_time(100);
        assert_eq!(animation.current_loop(), 0);
        assert_eq!(animation.current_loop_time(), 100);

        animation.set_current_time(0);
        assert_eq!(animation.state(), State::Stopped);
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_set_direction_on_stopped_moves_to_end() {
        let animation = LeafAnimation::new(80);
        animation.set_loop_count(3);
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        animation.on_direction_changed(move |direction| sink.borrow_mut().push(direction));

        animation.set_direction(Direction::Backward);
        assert_eq!(animation.current_loop_time(), 80);
        assert_eq!(animation.current_loop(), 2);

        animation.set_direction(Direction::Backward);
        animation.set_direction(Direction::Forward);
        assert_eq!(animation.current_loop_time(), 0);
        assert_eq!(animation.current_loop(), 0);

        assert_eq!(*changes.borrow(), vec![Direction::Backward, Direction::Forward]);
    }

    #[test]
    fn test_loop_changed_notifications() {
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(3);
        let loops = Rc::new(RefCell::new(Vec::new()));
        let sink = loops.clone();
        animation.on_current_loop_changed(move |current_loop| sink.borrow_mut().push(current_loop));

        animation.set_current_time(50);
        animation.set_current_time(150);
        animation.set_current_time(160);
        animation.set_current_time(250);

        assert_eq!(*loops.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_boundary_skip_still_finishes_at_clamped_end() {
        // A large jump past the end is clamped to the exact end first, so the
        // finished check sees a full final loop.
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(2);
        let finished = count_finished(&animation);
        animation.start();
        animation.set_current_time(5_000);
        assert_eq!(finished.get(), 1);
    }

    #[test]
    fn test_finished_uses_in_loop_time_not_total() {
        // Known edge, kept on purpose: the finished check multiplies the
        // in-loop time by the loop number. Total time equal to the total
        // duration is not enough when the last position was a loop start.
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.set_loop_count(3);
        let finished = count_finished(&animation);
        animation.start();
        animation.set_current_time(200);
        assert_eq!(animation.current_loop(), 2);
        assert_eq!(animation.current_loop_time(), 0);

        animation.set_loop_count(2);
        assert_eq!(animation.current_time(), animation.total_duration());
        animation.stop();
        assert_eq!(finished.get(), 0);
    }

    #[test]
    fn test_delete_when_stopped_drops_after_next_pass() {
        let _clock = install_manual_clock();
        let weak = {
            let animation = LeafAnimation::new(100);
            animation.start_with_policy(DeletionPolicy::DeleteWhenStopped);
            animation.downgrade()
        };

        let animation = weak.upgrade().expect("kept alive while running");
        animation.set_current_time(100);
        assert_eq!(animation.state(), State::Stopped);
        drop(animation);

        assert!(weak.upgrade().is_some());
        EventLoop::current().process_events();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_restart_with_keep_policy_releases_self_reference() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        let weak = animation.downgrade();

        animation.start_with_policy(DeletionPolicy::DeleteWhenStopped);
        animation.pause();
        animation.start();
        assert_eq!(animation.deletion_policy(), DeletionPolicy::KeepWhenStopped);
        animation.stop();
        drop(animation);

        let event_loop = EventLoop::current();
        event_loop.process_events();
        event_loop.process_events();
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_keep_when_stopped_survives() {
        let _clock = install_manual_clock();
        let animation = LeafAnimation::new(100);
        animation.start();
        animation.set_current_time(100);
        EventLoop::current().process_events();
        assert_eq!(animation.state(), State::Stopped);
        assert_eq!(EventLoop::current().pending_deletions(), 0);
    }
}
