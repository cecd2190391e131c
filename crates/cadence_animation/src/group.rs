//! Parallel animation group
//!
//! Children of a running group are not top-level, so the scheduler never
//! ticks them directly. The group forwards its own in-loop time to each of
//! them instead and restarts them when the group moves to another loop.

use crate::animation::{Animation, AnimationKind, Direction, Drivable, State};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

#[derive(Default)]
struct GroupState {
    children: RefCell<Vec<Animation>>,
    last_loop: Cell<i32>,
    last_current_time: Cell<i32>,
    /// Indeterminate children that stopped on their own in this run
    finished_uncontrolled: RefCell<Vec<Animation>>,
}

impl GroupState {
    fn children(&self) -> Vec<Animation> {
        self.children.borrow().clone()
    }

    fn duration(&self) -> i32 {
        let mut duration = 0;
        for child in self.children.borrow().iter() {
            let child_duration = child.total_duration();
            if child_duration == -1 {
                return -1;
            }
            duration = duration.max(child_duration);
        }
        duration
    }

    /// Whether `child` should be playing at the group's current time
    fn should_start(&self, group: &Animation, child: &Animation, start_if_at_end: bool) -> bool {
        let child_duration = child.total_duration();
        if child_duration == -1 {
            return !self.is_uncontrolled_finished(child);
        }
        let current_time = group.current_loop_time();
        if start_if_at_end {
            return current_time <= child_duration;
        }
        match group.direction() {
            Direction::Forward => current_time < child_duration,
            Direction::Backward => current_time != 0 && current_time <= child_duration,
        }
    }

    fn is_uncontrolled_finished(&self, child: &Animation) -> bool {
        self.finished_uncontrolled.borrow().iter().any(|c| c == child)
    }

    fn record_finished_uncontrolled(&self, children: &[Animation]) {
        for child in children {
            if child.total_duration() == -1
                && child.state() == State::Stopped
                && !self.is_uncontrolled_finished(child)
            {
                self.finished_uncontrolled.borrow_mut().push(child.clone());
            }
        }
    }

    /// Every indeterminate child has finished and `current_time` is past
    /// the longest determinate one
    fn uncontrolled_done(&self, children: &[Animation], current_time: i32) -> bool {
        let mut has_uncontrolled = false;
        let mut max_duration = 0;
        for child in children {
            let child_duration = child.total_duration();
            if child_duration == -1 {
                if !self.is_uncontrolled_finished(child) {
                    return false;
                }
                has_uncontrolled = true;
            } else {
                max_duration = max_duration.max(child_duration);
            }
        }
        has_uncontrolled && current_time >= max_duration
    }

    fn reset_last_position(&self, group: &Animation, direction: Direction) {
        match direction {
            Direction::Forward => {
                self.last_loop.set(0);
                self.last_current_time.set(0);
            }
            Direction::Backward => {
                let loop_count = group.loop_count();
                self.last_loop
                    .set(if loop_count == -1 { 0 } else { loop_count - 1 });
                self.last_current_time.set(self.duration());
            }
        }
    }
}

fn apply_group_state(group: &Animation, child: &Animation) {
    match group.state() {
        State::Running => child.start(),
        State::Paused if child.state() == State::Running => child.pause(),
        State::Paused | State::Stopped => {}
    }
}

struct GroupBehavior {
    state: Rc<GroupState>,
}

impl Drivable for GroupBehavior {
    fn kind(&self) -> AnimationKind {
        AnimationKind::Group
    }

    fn duration(&self) -> i32 {
        self.state.duration()
    }

    fn update_current_time(&self, group: &Animation, current_time: i32) {
        let children = self.state.children();
        if children.is_empty() {
            return;
        }
        if group.state() == State::Running {
            self.state.record_finished_uncontrolled(&children);
        }

        let current_loop = group.current_loop();
        let last_loop = self.state.last_loop.get();
        if current_loop > last_loop {
            // Finish the loop that was skipped over
            let duration = self.state.duration();
            if duration > 0 {
                for child in &children {
                    if child.state() != State::Stopped {
                        child.set_current_time(duration);
                    }
                }
            }
        } else if current_loop < last_loop {
            // Seeking backwards across a loop: rewind everything
            self.state.finished_uncontrolled.borrow_mut().clear();
            for child in &children {
                apply_group_state(group, child);
                child.set_current_time(0);
                child.stop();
            }
        }

        let last_current_time = self.state.last_current_time.get();
        for child in &children {
            let child_duration = child.total_duration();
            if current_loop > last_loop
                || self
                    .state
                    .should_start(group, child, last_current_time > child_duration)
            {
                apply_group_state(group, child);
            }

            if child.state() == group.state() {
                child.set_current_time(current_time);
                if child_duration > 0 && current_time > child_duration {
                    child.stop();
                }
            }
        }

        self.state.last_loop.set(current_loop);
        self.state.last_current_time.set(current_time);

        if group.state() == State::Running {
            self.state.record_finished_uncontrolled(&children);
            if self.state.uncontrolled_done(&children, current_time) {
                group.stop();
            }
        }
    }

    fn update_state(&self, group: &Animation, new_state: State, old_state: State) {
        let children = self.state.children();
        match new_state {
            State::Stopped => {
                for child in &children {
                    child.stop();
                }
            }
            State::Paused => {
                for child in &children {
                    if child.state() == State::Running {
                        child.pause();
                    }
                }
            }
            State::Running => {
                if old_state == State::Stopped {
                    self.state.reset_last_position(group, group.direction());
                    self.state.finished_uncontrolled.borrow_mut().clear();
                } else {
                    self.state.record_finished_uncontrolled(&children);
                }
                for child in &children {
                    if old_state == State::Stopped {
                        child.stop();
                    }
                    child.set_direction(group.direction());
                    if self
                        .state
                        .should_start(group, child, old_state == State::Stopped)
                    {
                        child.start();
                    }
                }
            }
        }
    }

    fn update_direction(&self, group: &Animation, direction: Direction) {
        if group.state() != State::Stopped {
            for child in self.state.children() {
                child.set_direction(direction);
            }
        } else {
            self.state.reset_last_position(group, direction);
        }
    }

    fn take_child(&self, group: &Animation, child: &Animation) -> bool {
        let index = self
            .state
            .children
            .borrow()
            .iter()
            .position(|c| c == child);
        match index {
            Some(index) => {
                take_at(&self.state, group, index);
                true
            }
            None => false,
        }
    }
}

fn take_at(state: &GroupState, group: &Animation, index: usize) -> Option<Animation> {
    let child = {
        let mut children = state.children.borrow_mut();
        if index >= children.len() {
            return None;
        }
        children.remove(index)
    };
    state.finished_uncontrolled.borrow_mut().retain(|c| *c != child);
    child.set_group(None);
    // A running child would otherwise keep running with nobody ticking it
    child.stop();

    if state.children.borrow().is_empty() {
        group.stop();
    }
    Some(child)
}

/// Plays all of its children at the same time
///
/// The group's duration is the longest child's total duration, or -1 if any
/// child is indeterminate.
#[derive(Clone)]
pub struct ParallelAnimationGroup {
    animation: Animation,
    state: Rc<GroupState>,
}

impl ParallelAnimationGroup {
    pub fn new() -> Self {
        let state = Rc::new(GroupState::default());
        let animation = Animation::new(GroupBehavior {
            state: Rc::clone(&state),
        });
        Self { animation, state }
    }

    /// Append `child`, moving it out of any group it was in
    ///
    /// The child is stopped first.
    pub fn add_animation(&self, child: &Animation) {
        if *child == self.animation || child.group().as_ref() == Some(&self.animation) {
            tracing::warn!("ParallelAnimationGroup::add_animation: animation is already in this group");
            return;
        }
        child.detach_from_group();
        child.stop();
        self.state.children.borrow_mut().push(child.clone());
        child.set_group(Some(&self.animation));
    }

    /// Remove `child`; returns `false` if it is not a child of this group
    pub fn remove_animation(&self, child: &Animation) -> bool {
        match self.index_of_animation(child) {
            Some(index) => take_at(&self.state, &self.animation, index).is_some(),
            None => {
                tracing::warn!("ParallelAnimationGroup::remove_animation: not a child of this group");
                false
            }
        }
    }

    /// Remove and return the child at `index`
    pub fn take_animation(&self, index: usize) -> Option<Animation> {
        let child = take_at(&self.state, &self.animation, index);
        if child.is_none() {
            tracing::warn!(
                "ParallelAnimationGroup::take_animation: no animation at index {}",
                index
            );
        }
        child
    }

    pub fn clear(&self) {
        while take_at(&self.state, &self.animation, 0).is_some() {}
    }

    pub fn animation_count(&self) -> usize {
        self.state.children.borrow().len()
    }

    pub fn animation_at(&self, index: usize) -> Option<Animation> {
        self.state.children.borrow().get(index).cloned()
    }

    pub fn index_of_animation(&self, child: &Animation) -> Option<usize> {
        self.state.children.borrow().iter().position(|c| c == child)
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn into_animation(self) -> Animation {
        self.animation
    }
}

impl Default for ParallelAnimationGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for ParallelAnimationGroup {
    type Target = Animation;

    fn deref(&self) -> &Animation {
        &self.animation
    }
}

impl fmt::Debug for ParallelAnimationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelAnimationGroup")
            .field("children", &self.animation_count())
            .field("animation", &self.animation)
            .finish()
    }
}
