//! Transport trait and factory for queue operations.

use crate::error::QueueError;
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveOptions,
    ReceivedMessage,
};
use crate::provider::{ProviderType, TransportConfig};
use crate::providers::{AwsSqsProvider, InMemoryProvider};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;

/// Interface implemented by every queue backend.
///
/// Queues are addressed by the URL returned from [`QueueTransport::create_queue`].
/// Delivery is at-least-once: a received message that is not deleted before its
/// visibility timeout elapses is delivered again with a new receipt handle.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Receive up to `options.max_messages`, waiting at most `options.wait_time`
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledge a delivery so it is never redelivered
    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError>;

    /// Send a single message
    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError>;

    /// Create a queue, returning its URL. Creating an existing queue returns
    /// the existing URL.
    async fn create_queue(&self, name: &QueueName) -> Result<QueueUrl, QueueError>;

    /// Delete a queue and every message in it
    async fn delete_queue(&self, queue_url: &QueueUrl) -> Result<(), QueueError>;

    /// Remove every message from a queue, including in-flight ones
    async fn purge_queue(&self, queue_url: &QueueUrl) -> Result<(), QueueError>;

    /// Fetch queue attributes such as approximate message counts
    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
    ) -> Result<HashMap<String, String>, QueueError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}

/// Factory for creating transports from configuration
pub struct TransportFactory;

impl TransportFactory {
    /// Create a shared transport for the configured provider
    pub async fn create(config: TransportConfig) -> Result<Arc<dyn QueueTransport>, QueueError> {
        config.validate()?;

        let transport: Arc<dyn QueueTransport> = match config {
            TransportConfig::InMemory(in_memory_config) => {
                Arc::new(InMemoryProvider::new(in_memory_config))
            }
            TransportConfig::AwsSqs(aws_config) => Arc::new(
                AwsSqsProvider::new(aws_config)
                    .await
                    .map_err(|e| e.to_queue_error())?,
            ),
        };

        Ok(transport)
    }

    /// Create an in-memory transport with default configuration
    pub fn create_test_transport() -> Arc<dyn QueueTransport> {
        Arc::new(InMemoryProvider::default())
    }
}
