//! # Queue Runtime
//!
//! Provider-agnostic queue transport used by the queue listener.
//!
//! This library provides:
//! - A [`QueueTransport`] trait covering receive, delete, send and queue
//!   administration
//! - An AWS SQS implementation speaking the SQS JSON protocol
//! - An in-memory implementation with visibility timeouts and long polling
//!   for tests and local development
//!
//! ## Module Organization
//!
//! - [error] - Error types for all queue operations
//! - [message] - Queue identifiers, messages and receipt handles
//! - [provider] - Provider types and configuration
//! - [transport] - The transport trait and factory
//! - [providers] - Concrete transport implementations

// Module declarations
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use error::{ConfigurationError, QueueError, SerializationError, ValidationError};
pub use message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveOptions,
    ReceivedMessage, APPROXIMATE_RECEIVE_COUNT, MAX_RECEIVE_BATCH, MAX_WAIT_TIME, SENT_TIMESTAMP,
};
pub use provider::{AwsSqsConfig, InMemoryConfig, ProviderType, TransportConfig};
pub use providers::{AwsError, AwsSqsProvider, InMemoryProvider, MAX_MESSAGE_ATTRIBUTES};
pub use transport::{QueueTransport, TransportFactory};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
