// THEORY:
// The `error` module holds the single error taxonomy for the whole engine.
//
// Key architectural principles:
// 1.  **Fail Early on Configuration**: Every `ConfigError` is raised while a color is
//     registered or settings are built/loaded, never in the middle of a frame loop.
// 2.  **Absence Is Not Failure**: A frame with no qualifying object is a normal
//     outcome (`None` position) and never surfaces here.
// 3.  **Collaborator Errors Pass Through**: I/O, JSON and video backend failures are
//     wrapped as-is so the caller sees the original cause.

use thiserror::Error;

/// Convenient result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Configuration problems detected at registration or load time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("color `{0}` is already registered")]
    DuplicateColorName(String),

    #[error("color `{0}` is not registered")]
    UnknownColorName(String),

    #[error("invalid HSV range for color `{name}`: {reason}")]
    InvalidRange { name: String, reason: String },

    #[error("{which} kernel size must be a positive odd integer no larger than 255, got {size}")]
    InvalidKernelSize { which: &'static str, size: i64 },

    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// An observation that does not strictly follow the last one in a trajectory.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OrderError {
    #[error("frame index {found} does not follow {previous}")]
    FrameIndex { found: u64, previous: u64 },

    #[error("timestamp {found} ms does not follow {previous} ms")]
    Timestamp { found: u64, previous: u64 },
}

/// Top-level error for every fallible operation in the engine.
#[derive(Debug, Error)]
pub enum TrailError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid frame: {width}x{height} has zero area")]
    InvalidFrame { width: u32, height: u32 },

    #[error("coordinate table format error at line {line}: {reason}")]
    Format { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration file error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("video backend error: {0}")]
    Video(String),

    #[error("internal invariant violated: {0}")]
    Internal(&'static str),
}

impl TrailError {
    pub(crate) fn format(line: usize, reason: impl Into<String>) -> Self {
        TrailError::Format {
            line,
            reason: reason.into(),
        }
    }
}
