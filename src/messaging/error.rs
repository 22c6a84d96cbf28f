//! Error types for messaging operations

use crate::error::AppError;

/// Result type for messaging operations
pub type MessagingResult<T> = std::result::Result<T, MessagingError>;

/// Errors that can occur during messaging operations
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Exchange or queue declaration failed
    #[error("Declare failed: {0}")]
    DeclareFailed(String),

    /// Publish failed
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Consume failed
    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    /// Ack or nack could not be delivered to the broker
    #[error("Acknowledgement failed: {0}")]
    AckFailed(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Exchange was never declared
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// Queue was never declared
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// Backend not available
    #[error("Backend not available: {0}")]
    BackendUnavailable(String),

    /// Operation aborted by shutdown
    #[error("Operation cancelled")]
    Cancelled,
}

impl MessagingError {
    /// Connectivity failures are fatal to the owning publisher or consumer.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            MessagingError::ConnectionFailed(_) | MessagingError::BackendUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::SerializationError(err.to_string())
    }
}

impl From<MessagingError> for AppError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::ConfigurationError(msg) => AppError::Configuration(msg),
            _ => AppError::Messaging(err.to_string()),
        }
    }
}
