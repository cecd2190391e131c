//! Scene files
//!
//! A scene is a TOML file with an optional `[timer]` table, any number of
//! `[[group]]` tables (parallel groups) and `[[animation]]` tables.

use anyhow::{bail, Context, Result};
use cadence_animation::{Direction, TimerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// A complete scene description
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SceneConfig {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub group: Vec<GroupSpec>,
    #[serde(default)]
    pub animation: Vec<AnimationSpec>,
}

/// A parallel group
#[derive(Debug, Deserialize, Serialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default = "default_loop_count")]
    pub loop_count: i32,
    #[serde(default)]
    pub direction: Direction,
    /// Milliseconds after scene start
    #[serde(default)]
    pub start_delay: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationSpecKind {
    Leaf,
    Pause,
}

/// A leaf or pause animation
#[derive(Debug, Deserialize, Serialize)]
pub struct AnimationSpec {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: AnimationSpecKind,
    pub duration: i32,
    #[serde(default = "default_loop_count")]
    pub loop_count: i32,
    #[serde(default)]
    pub direction: Direction,
    /// Milliseconds after scene start; only for animations outside a group
    #[serde(default)]
    pub start_delay: u64,
    /// Name of the group this animation belongs to
    #[serde(default)]
    pub group: Option<String>,
}

fn default_loop_count() -> i32 {
    1
}

fn default_kind() -> AnimationSpecKind {
    AnimationSpecKind::Leaf
}

impl SceneConfig {
    /// Load and validate a scene file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let scene = Self::parse(&content)
            .with_context(|| format!("Failed to load scene {}", path.display()))?;
        Ok(scene)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let scene: SceneConfig = toml::from_str(content).context("Failed to parse scene")?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> Result<()> {
        self.timer.validate()?;

        let mut names = HashSet::new();
        for name in self
            .group
            .iter()
            .map(|g| g.name.as_str())
            .chain(self.animation.iter().map(|a| a.name.as_str()))
        {
            if !names.insert(name) {
                bail!("Duplicate animation name '{}'", name);
            }
        }

        let groups: HashSet<&str> = self.group.iter().map(|g| g.name.as_str()).collect();
        for animation in &self.animation {
            match animation.kind {
                AnimationSpecKind::Pause if animation.duration < 0 => bail!(
                    "Pause animation '{}' has a negative duration",
                    animation.name
                ),
                AnimationSpecKind::Leaf if animation.duration < -1 => bail!(
                    "Animation '{}' has an invalid duration {}",
                    animation.name,
                    animation.duration
                ),
                _ => {}
            }

            if let Some(group) = &animation.group {
                if !groups.contains(group.as_str()) {
                    bail!(
                        "Animation '{}' refers to unknown group '{}'",
                        animation.name,
                        group
                    );
                }
                if animation.start_delay > 0 {
                    bail!(
                        "Animation '{}' is in group '{}' and cannot have a start_delay",
                        animation.name,
                        group
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"
        [timer]
        timing_interval = 10
        consistent_timing = true

        [[group]]
        name = "intro"

        [[animation]]
        name = "fade"
        duration = 300
        loop_count = 2
        group = "intro"

        [[animation]]
        name = "hold"
        kind = "pause"
        duration = 500
        direction = "backward"
        start_delay = 100
    "#;

    #[test]
    fn test_parse_scene() {
        let scene = SceneConfig::parse(SCENE).unwrap();
        assert_eq!(scene.timer.timing_interval, 10);
        assert!(scene.timer.consistent_timing);
        assert_eq!(scene.timer.slowdown_factor, 5.0);

        assert_eq!(scene.group.len(), 1);
        assert_eq!(scene.group[0].loop_count, 1);

        let fade = &scene.animation[0];
        assert_eq!(fade.kind, AnimationSpecKind::Leaf);
        assert_eq!(fade.group.as_deref(), Some("intro"));

        let hold = &scene.animation[1];
        assert_eq!(hold.kind, AnimationSpecKind::Pause);
        assert_eq!(hold.direction, Direction::Backward);
        assert_eq!(hold.start_delay, 100);
    }

    #[test]
    fn test_empty_scene_uses_defaults() {
        let scene = SceneConfig::parse("").unwrap();
        assert_eq!(scene.timer, TimerConfig::default());
        assert!(scene.animation.is_empty());
    }

    #[test]
    fn test_rejects_unknown_group() {
        let err = SceneConfig::parse(
            r#"
            [[animation]]
            name = "fade"
            duration = 100
            group = "missing"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown group"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = SceneConfig::parse(
            r#"
            [[group]]
            name = "fade"

            [[animation]]
            name = "fade"
            duration = 100
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_rejects_invalid_timer() {
        let result = SceneConfig::parse(
            r#"
            [timer]
            timing_interval = 0
            "#,
        );
        assert!(result.is_err());
    }
}
