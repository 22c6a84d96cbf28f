//! Error types for pipeline stage handlers

use crate::error::AppError;
use crate::messaging::MessagingError;
use crate::vector::VectorStoreError;

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Errors raised while running a pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Text extraction failed
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Embedding service failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Sentiment classifier failed
    #[error("Classification failed: {0}")]
    Classification(String),

    /// Metric evaluator failed
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Persistence collaborator failed
    #[error("Store error: {0}")]
    Store(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Payload is well-formed but unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Vector store gateway error
    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    /// Follow-up publish failed
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    /// Operation aborted by shutdown
    #[error("Operation cancelled")]
    Cancelled,
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Extraction(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::VectorStore(e) => e.into(),
            PipelineError::Messaging(e) => e.into(),
            other => AppError::Pipeline(other.to_string()),
        }
    }
}
