//! Building and playing scenes

use crate::config::{AnimationSpecKind, SceneConfig};
use cadence_animation::{
    Animation, AnimationKind, LeafAnimation, ParallelAnimationGroup, PauseAnimation, State,
};
use cadence_core::EventLoop;
use std::collections::HashMap;
use std::rc::Rc;

/// One named animation of a loaded scene
pub struct SceneEntry {
    pub name: String,
    pub animation: Animation,
    /// Milliseconds after scene start, for top-level entries
    pub start_delay: Option<u64>,
}

/// The animations of a scene, in declaration order (groups first)
pub struct Scene {
    entries: Vec<SceneEntry>,
}

impl Scene {
    pub fn build(config: &SceneConfig) -> Self {
        let mut entries = Vec::new();
        let mut groups = HashMap::new();

        for spec in &config.group {
            let group = ParallelAnimationGroup::new();
            group.set_loop_count(spec.loop_count);
            group.set_direction(spec.direction);
            entries.push(SceneEntry {
                name: spec.name.clone(),
                animation: group.animation().clone(),
                start_delay: Some(spec.start_delay),
            });
            groups.insert(spec.name.as_str(), group);
        }

        for spec in &config.animation {
            let animation = match spec.kind {
                AnimationSpecKind::Leaf => LeafAnimation::new(spec.duration).into_animation(),
                AnimationSpecKind::Pause => PauseAnimation::new(spec.duration).into_animation(),
            };
            animation.set_loop_count(spec.loop_count);
            animation.set_direction(spec.direction);

            let group = spec.group.as_deref().and_then(|name| groups.get(name));
            if let Some(group) = group {
                group.add_animation(&animation);
            }
            entries.push(SceneEntry {
                name: spec.name.clone(),
                animation,
                start_delay: group.is_none().then_some(spec.start_delay),
            });
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[SceneEntry] {
        &self.entries
    }

    pub fn top_level(&self) -> impl Iterator<Item = &SceneEntry> {
        self.entries.iter().filter(|e| e.start_delay.is_some())
    }

    /// Log state changes and finished events of every entry
    pub fn trace_events(&self) {
        for entry in &self.entries {
            let name = Rc::<str>::from(entry.name.as_str());
            let state_name = name.clone();
            entry.animation.on_state_changed(move |new_state, old_state| {
                tracing::info!("{}: {:?} -> {:?}", state_name, old_state, new_state);
            });
            entry.animation.on_finished(move || {
                tracing::info!("{}: finished", name);
            });
        }
    }

    /// Arm a start timer for every top-level entry
    pub fn schedule(&self, event_loop: &EventLoop) {
        for entry in self.top_level() {
            let delay = entry.start_delay.unwrap_or(0);
            let animation = entry.animation.downgrade();
            event_loop.single_shot(delay, move || {
                if let Some(animation) = animation.upgrade() {
                    animation.start();
                }
            });
        }
    }

    /// Latest start delay among top-level entries
    pub fn last_start(&self) -> u64 {
        self.top_level()
            .filter_map(|e| e.start_delay)
            .max()
            .unwrap_or(0)
    }

    pub fn all_stopped(&self) -> bool {
        self.entries.iter().all(|e| e.animation.state() == State::Stopped)
    }
}

/// Short label for an animation's kind
pub fn kind_label(kind: AnimationKind) -> &'static str {
    match kind {
        AnimationKind::Leaf => "leaf",
        AnimationKind::Pause => "pause",
        AnimationKind::Group => "group",
    }
}

/// One table cell: state initial, loop and in-loop time
pub fn describe(animation: &Animation) -> String {
    let state = match animation.state() {
        State::Stopped => 'S',
        State::Paused => 'P',
        State::Running => 'R',
    };
    format!(
        "{} {}/{}",
        state,
        animation.current_loop(),
        animation.current_loop_time()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_animation::UnifiedTimer;
    use cadence_core::ManualClock;

    const SCENE: &str = r#"
        [[group]]
        name = "intro"

        [[animation]]
        name = "fade"
        duration = 100
        group = "intro"

        [[animation]]
        name = "slide"
        duration = 200
        group = "intro"

        [[animation]]
        name = "hold"
        kind = "pause"
        duration = 150
        start_delay = 50
    "#;

    #[test]
    fn test_build_scene() {
        let config = SceneConfig::parse(SCENE).unwrap();
        let scene = Scene::build(&config);

        let names: Vec<_> = scene.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["intro", "fade", "slide", "hold"]);

        let top_level: Vec<_> = scene.top_level().map(|e| e.name.as_str()).collect();
        assert_eq!(top_level, vec!["intro", "hold"]);
        assert_eq!(scene.entries()[0].animation.duration(), 200);
        assert_eq!(scene.last_start(), 50);
    }

    #[test]
    fn test_scheduled_scene_plays_to_the_end() {
        let clock = Rc::new(ManualClock::new());
        let event_loop = EventLoop::current();
        event_loop.set_clock(clock.clone());

        let config = SceneConfig::parse(SCENE).unwrap();
        UnifiedTimer::instance().configure(&config.timer);
        let scene = Scene::build(&config);
        scene.schedule(&event_loop);

        event_loop.run_until(40);
        assert_eq!(scene.entries()[0].animation.state(), State::Running);
        assert_eq!(scene.entries()[3].animation.state(), State::Stopped);

        event_loop.run_until(60);
        assert_eq!(scene.entries()[3].animation.state(), State::Running);

        event_loop.run_until(400);
        assert!(scene.all_stopped());
        assert_eq!(describe(&scene.entries()[2].animation), "S 0/200");
    }
}
