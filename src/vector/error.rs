//! Vector store error kinds

use crate::error::AppError;

/// Result type for vector store operations
pub type VectorStoreResult<T> = std::result::Result<T, VectorStoreError>;

/// Vector store failures, split so callers can branch on the kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VectorStoreError {
    /// Store unreachable, timed out or overloaded
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    /// Collection does not exist
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// Collection exists with different vector parameters
    #[error("Collection {name} exists with incompatible parameters: {detail}")]
    IncompatibleCollection { name: String, detail: String },

    /// Store refused the request
    #[error("Vector store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Anything else
    #[error("Vector store error: {0}")]
    Other(String),
}

impl VectorStoreError {
    /// Whether the store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, VectorStoreError::Unavailable(_))
    }
}

impl From<VectorStoreError> for AppError {
    fn from(err: VectorStoreError) -> Self {
        match err {
            VectorStoreError::Unavailable(msg) => AppError::VectorStoreUnavailable(msg),
            other => AppError::VectorStore(other.to_string()),
        }
    }
}
