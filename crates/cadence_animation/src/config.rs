//! Scheduler configuration

use crate::error::{AnimationError, Result};
use serde::{Deserialize, Serialize};

/// Options recognised by the [`UnifiedTimer`](crate::UnifiedTimer)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Tick interval of the continuous driver in milliseconds
    #[serde(default = "default_timing_interval")]
    pub timing_interval: i32,
    /// Force every continuous tick to advance by exactly `timing_interval`
    #[serde(default)]
    pub consistent_timing: bool,
    /// Divide every tick by `slowdown_factor` (debugging aid)
    #[serde(default)]
    pub slow_mode: bool,
    #[serde(default = "default_slowdown_factor")]
    pub slowdown_factor: f32,
}

fn default_timing_interval() -> i32 {
    16
}

fn default_slowdown_factor() -> f32 {
    5.0
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            timing_interval: default_timing_interval(),
            consistent_timing: false,
            slow_mode: false,
            slowdown_factor: default_slowdown_factor(),
        }
    }
}

impl TimerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timing_interval < 1 {
            return Err(AnimationError::InvalidConfig(format!(
                "timing_interval must be at least 1ms, got {}",
                self.timing_interval
            )));
        }
        if !self.slowdown_factor.is_finite() {
            return Err(AnimationError::InvalidConfig(format!(
                "slowdown_factor must be finite, got {}",
                self.slowdown_factor
            )));
        }
        Ok(())
    }
}
