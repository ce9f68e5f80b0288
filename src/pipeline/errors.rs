//! Pipeline error types.

use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors from stage dispatch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The stage's workers have shut down.
    #[error("stage {0} is closed")]
    Closed(String),

    /// A worker thread could not be spawned.
    #[error("could not spawn worker for stage {0}")]
    SpawnFailed(String),
}
