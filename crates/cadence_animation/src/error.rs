//! Error types for the animation engine

use thiserror::Error;

/// Errors reported by driver installation and configuration
///
/// Playback control (`start`, `pause`, `resume`, `stop`) never fails; misuse
/// there is logged instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnimationError {
    #[error("cannot change animation driver while animations are running")]
    DriverRunning,

    #[error("animation driver is not installed")]
    DriverNotInstalled,

    #[error("invalid timer configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for animation engine operations
pub type Result<T> = std::result::Result<T, AnimationError>;
