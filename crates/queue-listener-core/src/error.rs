//! Error types for listener lifecycle and message processing.

use queue_runtime::{QueueError, ValidationError};

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

// ============================================================================
// Listener Errors
// ============================================================================

/// Errors returned synchronously by listener and retry-processor operations
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Invalid argument '{field}': {message}")]
    InvalidArgument { field: String, message: String },

    #[error("Listener already running for queue: {queue_url}")]
    AlreadyRunning { queue_url: String },

    #[error("No listener running for queue: {queue_url}")]
    NotRunning { queue_url: String },

    #[error("No processor registered for queue: {queue_url}")]
    NoProcessor { queue_url: String },
}

impl ListenerError {
    /// Create an invalid-argument error for a named field
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Check whether the operation was rejected because of the listener's
    /// current lifecycle state rather than its input
    pub fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning { .. } | Self::NotRunning { .. } | Self::NoProcessor { .. }
        )
    }
}

impl From<ValidationError> for ListenerError {
    fn from(error: ValidationError) -> Self {
        let field = match &error {
            ValidationError::Required { field }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::OutOfRange { field, .. } => field.clone(),
        };

        Self::InvalidArgument {
            field,
            message: error.to_string(),
        }
    }
}

// ============================================================================
// Processing Errors
// ============================================================================

/// Failure reported by a message processor for a single message
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    #[error("Failed to deserialize message body: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Handler failed: {0}")]
    Handler(#[from] anyhow::Error),

    #[error("Queue transport failed: {0}")]
    Transport(#[from] QueueError),
}

impl ProcessingError {
    /// Create an invalid-message error
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage {
            message: message.into(),
        }
    }

    /// Stable name of the failure category, recorded on dead-lettered messages
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidMessage { .. } => "InvalidMessage",
            Self::Deserialization(_) => "DeserializationError",
            Self::Handler(_) => "HandlerError",
            Self::Transport(_) => "TransportError",
        }
    }
}
