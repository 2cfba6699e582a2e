//! Error types for queue transport operations.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for all queue transport operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue not found: {queue_url}")]
    QueueNotFound { queue_url: String },

    #[error("Queue already exists: {queue_name}")]
    QueueAlreadyExists { queue_name: String },

    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] SerializationError),

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the operation may succeed when repeated
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::QueueAlreadyExists { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::PermissionDenied { .. } => false,
            Self::MessageTooLarge { .. } => false,
            Self::ProviderError { .. } => true, // Throttling and 5xx land here
            Self::SerializationError(_) => false,
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }

    /// Short, stable name of the error kind, suitable for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueNotFound { .. } => "QueueNotFound",
            Self::QueueAlreadyExists { .. } => "QueueAlreadyExists",
            Self::MessageNotFound { .. } => "MessageNotFound",
            Self::Timeout { .. } => "Timeout",
            Self::ConnectionFailed { .. } => "ConnectionFailed",
            Self::AuthenticationFailed { .. } => "AuthenticationFailed",
            Self::PermissionDenied { .. } => "PermissionDenied",
            Self::MessageTooLarge { .. } => "MessageTooLarge",
            Self::ProviderError { .. } => "ProviderError",
            Self::SerializationError(_) => "SerializationError",
            Self::ConfigurationError(_) => "ConfigurationError",
            Self::ValidationError(_) => "ValidationError",
        }
    }
}

/// Errors while encoding requests or decoding provider responses
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message attribute '{key}' has invalid value")]
    InvalidAttribute { key: String },

    #[error("Unexpected response from provider: {message}")]
    UnexpectedResponse { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
