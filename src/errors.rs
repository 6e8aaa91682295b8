use std::path::PathBuf;

use crate::vector_store::StoreError;

/// Error taxonomy for the indexing and retrieval pipeline.
///
/// Per-video and per-frame failures are converted into structured outcomes at
/// the orchestrator boundary; these variants carry enough context to report
/// which input failed and why.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("video file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("failed to decode {video}: {reason}")]
    DecodeFailure { video: PathBuf, reason: String },

    #[error("no frames decoded from {0}")]
    EmptyVideo(PathBuf),

    #[error("no embeddings generated for {0}")]
    EmptyInput(PathBuf),

    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::embedder::EncoderError> for PipelineError {
    fn from(err: crate::embedder::EncoderError) -> Self {
        match err {
            crate::embedder::EncoderError::Unavailable(msg) => {
                PipelineError::EncoderUnavailable(msg)
            }
            other => PipelineError::EncoderUnavailable(other.to_string()),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
