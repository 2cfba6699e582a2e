//! # Message Processors
//!
//! The [`MessageProcessor`] capability consumed by listeners, together with a
//! JSON-decoding reference implementation and a logging processor.
//!
//! Delivery is at-least-once, so every processor must tolerate seeing the
//! same logical message more than once.

use crate::error::ProcessingError;
use async_trait::async_trait;
use queue_runtime::ReceivedMessage;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use tracing::info;

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

/// Consumes one received message
///
/// Returning `Ok` lets the listener acknowledge (delete) the message; an error
/// leaves it on the queue for redelivery once its visibility timeout elapses.
#[async_trait]
pub trait MessageProcessor: Send + Sync {
    /// Process a single message
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError>;
}

/// Decode a message body as JSON into `T`
///
/// # Errors
///
/// - [`ProcessingError::InvalidMessage`] when the body is empty or blank
/// - [`ProcessingError::Deserialization`] when the body is not valid JSON for `T`
///
/// # Examples
///
/// ```rust
/// use queue_listener_core::parse_body;
/// use queue_runtime::{MessageId, ReceiptHandle, ReceivedMessage};
/// use serde::Deserialize;
/// use std::collections::HashMap;
///
/// #[derive(Deserialize)]
/// struct Order {
///     id: u64,
/// }
///
/// let message = ReceivedMessage {
///     message_id: MessageId::new(),
///     receipt_handle: ReceiptHandle::new("rh"),
///     body: r#"{"id": 42}"#.to_string(),
///     attributes: HashMap::new(),
/// };
///
/// let order: Order = parse_body(&message).unwrap();
/// assert_eq!(order.id, 42);
/// ```
pub fn parse_body<T: DeserializeOwned>(message: &ReceivedMessage) -> Result<T, ProcessingError> {
    if message.body.trim().is_empty() {
        return Err(ProcessingError::invalid_message("message body is empty"));
    }

    Ok(serde_json::from_str(&message.body)?)
}

// ============================================================================
// JSON Processor
// ============================================================================

/// Processor that decodes each body as JSON and passes the value to a handler
///
/// # Examples
///
/// ```rust
/// use queue_listener_core::{JsonMessageProcessor, ProcessingError};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Order {
///     id: u64,
/// }
///
/// let processor = JsonMessageProcessor::new(|order: Order| async move {
///     tracing::info!(order_id = order.id, "Handling order");
///     Ok::<(), ProcessingError>(())
/// });
/// ```
pub struct JsonMessageProcessor<T, F> {
    handler: F,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F, Fut> JsonMessageProcessor<T, F>
where
    T: DeserializeOwned,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), ProcessingError>>,
{
    /// Create a processor around an async handler
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> MessageProcessor for JsonMessageProcessor<T, F>
where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessingError>> + Send + 'static,
{
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        let payload = parse_body::<T>(message)?;
        (self.handler)(payload).await
    }
}

// ============================================================================
// Logging Processor
// ============================================================================

/// Processor that only records each message it sees
///
/// Used as the default when no application processor is configured for a
/// queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProcessor;

#[async_trait]
impl MessageProcessor for LoggingProcessor {
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        info!(
            message_id = %message.message_id,
            body_len = message.body.len(),
            attribute_count = message.attributes.len(),
            receive_count = ?message.receive_count(),
            "Received message"
        );
        Ok(())
    }
}
