//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while driving FFmpeg or painting overlays.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("ffmpeg not found in PATH")]
    ToolNotFound,

    #[error("ffprobe not found in PATH")]
    ProbeNotFound,

    #[error("{command} failed with exit code {exit_code:?}")]
    ToolFailure {
        command: String,
        exit_code: Option<i32>,
        /// Last lines of the error stream, newest last.
        tail: Vec<String>,
    },

    #[error("{command} exceeded its {deadline_secs}s deadline")]
    ToolTimeout {
        command: String,
        deadline_secs: u64,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("no usable caption font (configured, bundled and system fallbacks all failed)")]
    FontUnavailable,

    #[error("asset missing: {0}")]
    AssetMissing(PathBuf),

    #[error("concat input invalid: {0}")]
    ConcatInputInvalid(String),

    #[error("BGM mix failed: {0}")]
    MixerFailure(String),

    #[error("probe output unreadable: {0}")]
    ProbeFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("audio file unreadable: {0}")]
    Audio(#[from] hound::Error),
}

impl MediaError {
    /// Create a tool failure carrying the tail of its error stream.
    pub fn tool_failure(
        command: impl Into<String>,
        exit_code: Option<i32>,
        tail: Vec<String>,
    ) -> Self {
        Self::ToolFailure {
            command: command.into(),
            exit_code,
            tail,
        }
    }
}
