//! Pipeline error types.

use thiserror::Error;

use lform_media::MediaError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors raised while orchestrating a render.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("script contains no usable sections")]
    EmptyScript,

    #[error("chunk {chunk} has non-positive duration {seconds}")]
    InvalidDuration { chunk: usize, seconds: f64 },

    #[error("scene {scene_id} failed to render")]
    SceneRenderFailed {
        scene_id: String,
        #[source]
        source: MediaError,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// True when the failure was a cooperative cancellation rather than a
    /// defect; callers exit quietly for these.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            PipelineError::Media(MediaError::Cancelled)
                | PipelineError::SceneRenderFailed {
                    source: MediaError::Cancelled,
                    ..
                }
        )
    }
}
