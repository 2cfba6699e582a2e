//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// System attribute carrying the number of times a message has been received
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// System attribute carrying the send time in epoch milliseconds
pub const SENT_TIMESTAMP: &str = "SentTimestamp";

/// Upper bound on messages returned by a single receive call
pub const MAX_RECEIVE_BATCH: u32 = 10;

/// Upper bound on the server-side long-poll wait
pub const MAX_WAIT_TIME: Duration = Duration::from_secs(20);

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated queue name used when creating queues
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        let base = name.strip_suffix(".fifo").unwrap_or(&name);

        if base.is_empty() || name.len() > 80 {
            return Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: "must be 1-80 characters".to_string(),
            });
        }

        if !base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: "only ASCII alphanumeric, hyphens, and underscores allowed".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Check whether the name designates a FIFO queue
    pub fn is_fifo(&self) -> bool {
        self.0.ends_with(".fifo")
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Address of a queue as handed out by the transport on creation.
///
/// The URL is treated as opaque apart from being non-empty; providers decide
/// what a well-formed URL looks like.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueUrl(String);

impl QueueUrl {
    /// Create new queue URL, rejecting empty or blank input
    pub fn new(url: impl Into<String>) -> Result<Self, ValidationError> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Required {
                field: "queue_url".to_string(),
            });
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: "must not contain whitespace".to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Last path segment of the URL, which is the queue name for SQS-style URLs
    pub fn queue_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Get queue URL as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueUrl {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueUrl {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueUrl> for String {
    fn from(url: QueueUrl) -> Self {
        url.0
    }
}

/// Unique identifier for messages within the queue system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque, single-use token identifying one delivery of a message.
///
/// Only valid until the visibility timeout of that delivery elapses; a
/// redelivery of the same message carries a different handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Wrap a provider-issued handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent through the queue system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub body: String,
    pub attributes: HashMap<String, String>,
}

impl OutgoingMessage {
    /// Create new message with body
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add every attribute from an existing map, overwriting duplicates
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.attributes
            .extend(attributes.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}

/// A message received from the queue together with its delivery token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt_handle: ReceiptHandle,
    pub body: String,
    /// System metadata and application attributes in a single map
    pub attributes: HashMap<String, String>,
}

impl ReceivedMessage {
    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Number of times the transport reports having delivered this message
    pub fn receive_count(&self) -> Option<u32> {
        self.attribute(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|v| v.parse().ok())
    }

    /// Convert back to an outgoing message carrying the same body and attributes
    pub fn to_outgoing(&self) -> OutgoingMessage {
        OutgoingMessage {
            body: self.body.clone(),
            attributes: self.attributes.clone(),
        }
    }
}

// ============================================================================
// Receive Options
// ============================================================================

/// Parameters for a single receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Maximum number of messages to return (1-10)
    pub max_messages: u32,
    /// Long-poll wait; zero returns immediately when the queue is empty
    pub wait_time: Duration,
    /// How long received messages stay hidden from other receivers
    pub visibility_timeout: Duration,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            max_messages: MAX_RECEIVE_BATCH,
            wait_time: MAX_WAIT_TIME,
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

impl ReceiveOptions {
    /// Create new receive options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of messages to receive
    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = max;
        self
    }

    /// Set long-poll wait time
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    /// Set visibility timeout for received messages
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Check the options against transport limits
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_messages == 0 || self.max_messages > MAX_RECEIVE_BATCH {
            return Err(ValidationError::OutOfRange {
                field: "max_messages".to_string(),
                message: format!("must be between 1 and {}", MAX_RECEIVE_BATCH),
            });
        }

        if self.wait_time > MAX_WAIT_TIME {
            return Err(ValidationError::OutOfRange {
                field: "wait_time".to_string(),
                message: format!("must not exceed {} seconds", MAX_WAIT_TIME.as_secs()),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
