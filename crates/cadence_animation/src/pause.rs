//! Delay-only animation

use crate::animation::{Animation, AnimationKind, Drivable};
use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

const DEFAULT_PAUSE_DURATION: i32 = 250;

struct PauseBehavior {
    duration: Rc<Cell<i32>>,
}

impl Drivable for PauseBehavior {
    fn kind(&self) -> AnimationKind {
        AnimationKind::Pause
    }

    fn duration(&self) -> i32 {
        self.duration.get()
    }

    fn update_current_time(&self, _animation: &Animation, _current_time: i32) {}
}

/// An animation that only takes time
///
/// When nothing but pause animations are running the scheduler sleeps until
/// the first of them ends instead of ticking.
#[derive(Clone)]
pub struct PauseAnimation {
    animation: Animation,
    duration: Rc<Cell<i32>>,
}

impl PauseAnimation {
    pub fn new(duration: i32) -> Self {
        let pause = Self::default();
        pause.set_duration(duration);
        pause
    }

    pub fn set_duration(&self, duration: i32) {
        if duration < 0 {
            tracing::warn!(
                "PauseAnimation::set_duration: cannot set a negative duration ({})",
                duration
            );
            return;
        }
        self.duration.set(duration);
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn into_animation(self) -> Animation {
        self.animation
    }
}

impl Default for PauseAnimation {
    fn default() -> Self {
        let duration = Rc::new(Cell::new(DEFAULT_PAUSE_DURATION));
        let animation = Animation::new(PauseBehavior {
            duration: Rc::clone(&duration),
        });
        Self {
            animation,
            duration,
        }
    }
}

impl Deref for PauseAnimation {
    type Target = Animation;

    fn deref(&self) -> &Animation {
        &self.animation
    }
}

impl fmt::Debug for PauseAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PauseAnimation")
            .field("duration", &self.duration.get())
            .field("animation", &self.animation)
            .finish()
    }
}
