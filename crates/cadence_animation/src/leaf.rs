//! Callback-driven value animation

use crate::animation::{Animation, AnimationKind, Drivable};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

type UpdateCallback = Rc<dyn Fn(&Animation, i32)>;

struct LeafState {
    duration: Cell<i32>,
    callback: RefCell<Option<UpdateCallback>>,
    updates: Cell<u64>,
}

struct LeafBehavior {
    state: Rc<LeafState>,
}

impl Drivable for LeafBehavior {
    fn kind(&self) -> AnimationKind {
        AnimationKind::Leaf
    }

    fn duration(&self) -> i32 {
        self.state.duration.get()
    }

    fn update_current_time(&self, animation: &Animation, current_time: i32) {
        self.state.updates.set(self.state.updates.get() + 1);
        let callback = self.state.callback.borrow().clone();
        if let Some(callback) = callback {
            callback(animation, current_time);
        }
    }
}

/// An animation that hands its in-loop time to a callback
///
/// While running it keeps the scheduler in continuous mode. Interpolating a
/// value from the time is up to the callback.
#[derive(Clone)]
pub struct LeafAnimation {
    animation: Animation,
    state: Rc<LeafState>,
}

impl LeafAnimation {
    /// Create a leaf animation; a duration of -1 makes it indeterminate
    pub fn new(duration: i32) -> Self {
        let state = Rc::new(LeafState {
            duration: Cell::new(duration.max(-1)),
            callback: RefCell::new(None),
            updates: Cell::new(0),
        });
        let animation = Animation::new(LeafBehavior {
            state: Rc::clone(&state),
        });
        Self { animation, state }
    }

    pub fn with_callback<F>(duration: i32, callback: F) -> Self
    where
        F: Fn(&Animation, i32) + 'static,
    {
        let leaf = Self::new(duration);
        leaf.set_callback(callback);
        leaf
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Animation, i32) + 'static,
    {
        *self.state.callback.borrow_mut() = Some(Rc::new(callback));
    }

    pub fn set_duration(&self, duration: i32) {
        if duration < -1 {
            tracing::warn!(
                "LeafAnimation::set_duration: cannot set a negative duration ({})",
                duration
            );
            return;
        }
        self.state.duration.set(duration);
    }

    /// How many time updates the animation has received
    pub fn update_count(&self) -> u64 {
        self.state.updates.get()
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn into_animation(self) -> Animation {
        self.animation
    }
}

impl Deref for LeafAnimation {
    type Target = Animation;

    fn deref(&self) -> &Animation {
        &self.animation
    }
}

impl fmt::Debug for LeafAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafAnimation")
            .field("duration", &self.state.duration.get())
            .field("animation", &self.animation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::State;
    use crate::test_support::install_manual_clock;
    use cadence_core::EventLoop;

    #[test]
    fn test_callback_receives_in_loop_time() {
        let _clock = install_manual_clock();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let leaf = LeafAnimation::with_callback(40, move |animation, time| {
            sink.borrow_mut().push((animation.current_loop(), time))
        });
        leaf.set_loop_count(2);
        leaf.start();

        EventLoop::current().run_for(80);
        assert_eq!(leaf.state(), State::Stopped);
        assert_eq!(
            *seen.borrow(),
            vec![(0, 0), (0, 16), (0, 32), (1, 8), (1, 24), (1, 40)]
        );
    }

    #[test]
    fn test_rejects_invalid_duration() {
        let leaf = LeafAnimation::new(100);
        leaf.set_duration(-5);
        assert_eq!(leaf.duration(), 100);
        leaf.set_duration(-1);
        assert_eq!(leaf.duration(), -1);
    }
}
