//! In-memory queue provider implementation for testing and development.
//!
//! This module provides a fully functional in-memory queue implementation that:
//! - Hands out queue URLs on creation and addresses queues by URL
//! - Implements visibility timeouts with redelivery under a fresh receipt handle
//! - Reports `ApproximateReceiveCount` and `SentTimestamp` system attributes
//! - Supports long polling, woken early when a message is sent
//! - Provides thread-safe concurrent access
//!
//! This provider is intended for:
//! - Unit and integration testing of queue consumers
//! - Development and prototyping without cloud infrastructure

use crate::error::QueueError;
use crate::message::{
    MessageId, OutgoingMessage, QueueName, QueueUrl, ReceiptHandle, ReceiveOptions,
    ReceivedMessage, APPROXIMATE_RECEIVE_COUNT, SENT_TIMESTAMP,
};
use crate::provider::{InMemoryConfig, ProviderType};
use crate::transport::QueueTransport;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all queues
struct QueueStorage {
    queues: HashMap<QueueUrl, InMemoryQueue>,
    config: InMemoryConfig,
}

impl QueueStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    fn queue_mut(&mut self, queue_url: &QueueUrl) -> Result<&mut InMemoryQueue, QueueError> {
        self.queues
            .get_mut(queue_url)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_url: queue_url.to_string(),
            })
    }
}

/// Internal queue state for a single queue
struct InMemoryQueue {
    /// Messages available for receiving (FIFO order)
    messages: VecDeque<StoredMessage>,
    /// Received messages hidden until their visibility timeout elapses,
    /// keyed by the receipt handle of the current delivery
    in_flight: HashMap<String, InFlightMessage>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl InMemoryQueue {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            created_at: chrono::Utc::now(),
        }
    }

    fn len(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }

    /// Move every in-flight message whose visibility timeout elapsed back into
    /// the available set
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                debug!(
                    message_id = %in_flight.message.message_id,
                    "Visibility timeout elapsed, message available again"
                );
                self.messages.push_back(in_flight.message);
            }
        }
    }

    fn take_batch(
        &mut self,
        max_messages: u32,
        visibility_timeout: Duration,
        now: Instant,
    ) -> Vec<ReceivedMessage> {
        self.reclaim_expired(now);

        let mut batch = Vec::new();
        while batch.len() < max_messages as usize {
            let Some(mut message) = self.messages.pop_front() else {
                break;
            };

            message.receive_count += 1;
            let receipt = uuid::Uuid::new_v4().to_string();
            batch.push(message.to_received(ReceiptHandle::new(receipt.clone())));

            self.in_flight.insert(
                receipt,
                InFlightMessage {
                    message,
                    visible_at: now + visibility_timeout,
                },
            );
        }

        batch
    }

    /// Earliest instant at which an in-flight message becomes visible again
    fn next_visibility_deadline(&self) -> Option<Instant> {
        self.in_flight.values().map(|m| m.visible_at).min()
    }
}

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: MessageId,
    body: String,
    attributes: HashMap<String, String>,
    sent_at_millis: i64,
    receive_count: u32,
}

impl StoredMessage {
    fn from_outgoing(message: &OutgoingMessage, message_id: MessageId) -> Self {
        Self {
            message_id,
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            sent_at_millis: chrono::Utc::now().timestamp_millis(),
            receive_count: 0,
        }
    }

    fn to_received(&self, receipt_handle: ReceiptHandle) -> ReceivedMessage {
        let mut attributes = self.attributes.clone();
        attributes.insert(
            APPROXIMATE_RECEIVE_COUNT.to_string(),
            self.receive_count.to_string(),
        );
        attributes.insert(SENT_TIMESTAMP.to_string(), self.sent_at_millis.to_string());

        ReceivedMessage {
            message_id: self.message_id.clone(),
            receipt_handle,
            body: self.body.clone(),
            attributes,
        }
    }
}

/// A message currently hidden from receivers
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

fn poisoned() -> QueueError {
    QueueError::ProviderError {
        provider: ProviderType::InMemory.to_string(),
        code: "LockPoisoned".to_string(),
        message: "queue storage lock poisoned by a panicked thread".to_string(),
    }
}

// ============================================================================
// InMemoryProvider
// ============================================================================

/// In-memory queue provider implementation
pub struct InMemoryProvider {
    storage: Arc<RwLock<QueueStorage>>,
    message_arrived: Arc<Notify>,
}

impl InMemoryProvider {
    /// Create new in-memory provider with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(QueueStorage::new(config))),
            message_arrived: Arc::new(Notify::new()),
        }
    }
}

impl Default for InMemoryProvider {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

#[async_trait]
impl QueueTransport for InMemoryProvider {
    async fn receive_messages(
        &self,
        queue_url: &QueueUrl,
        options: &ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        options.validate()?;
        let deadline = Instant::now() + options.wait_time;

        loop {
            // Register interest before inspecting the queue so a send between
            // the check and the wait is not missed
            let notified = self.message_arrived.notified();

            let wake_at = {
                let mut storage = self.storage.write().map_err(|_| poisoned())?;
                let queue = storage.queue_mut(queue_url)?;
                let now = Instant::now();

                let batch = queue.take_batch(options.max_messages, options.visibility_timeout, now);
                if !batch.is_empty() {
                    return Ok(batch);
                }

                queue
                    .next_visibility_deadline()
                    .map_or(deadline, |visible_at| visible_at.min(deadline))
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }

            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn delete_message(
        &self,
        queue_url: &QueueUrl,
        receipt: &ReceiptHandle,
    ) -> Result<(), QueueError> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        let queue = storage.queue_mut(queue_url)?;

        let expired = match queue.in_flight.get(receipt.as_str()) {
            Some(in_flight) => in_flight.visible_at <= Instant::now(),
            None => true,
        };

        if expired {
            return Err(QueueError::MessageNotFound {
                receipt: receipt.to_string(),
            });
        }

        queue.in_flight.remove(receipt.as_str());
        Ok(())
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        message: &OutgoingMessage,
    ) -> Result<MessageId, QueueError> {
        let max_size = ProviderType::InMemory.max_message_size();
        if message.body.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: message.body.len(),
                max_size,
            });
        }

        let message_id = MessageId::new();
        {
            let mut storage = self.storage.write().map_err(|_| poisoned())?;
            let max_queue_size = storage.config.max_queue_size;
            let queue = storage.queue_mut(queue_url)?;

            if queue.len() >= max_queue_size {
                return Err(QueueError::ProviderError {
                    provider: ProviderType::InMemory.to_string(),
                    code: "QueueFull".to_string(),
                    message: format!("queue holds the maximum of {} messages", max_queue_size),
                });
            }

            queue
                .messages
                .push_back(StoredMessage::from_outgoing(message, message_id.clone()));
        }

        self.message_arrived.notify_waiters();
        Ok(message_id)
    }

    async fn create_queue(&self, name: &QueueName) -> Result<QueueUrl, QueueError> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        let url = QueueUrl::new(format!(
            "{}/{}",
            storage.config.base_url.trim_end_matches('/'),
            name
        ))?;

        storage
            .queues
            .entry(url.clone())
            .or_insert_with(InMemoryQueue::new);

        Ok(url)
    }

    async fn delete_queue(&self, queue_url: &QueueUrl) -> Result<(), QueueError> {
        {
            let mut storage = self.storage.write().map_err(|_| poisoned())?;
            storage
                .queues
                .remove(queue_url)
                .ok_or_else(|| QueueError::QueueNotFound {
                    queue_url: queue_url.to_string(),
                })?;
        }

        // Waiting receivers re-check and observe the missing queue
        self.message_arrived.notify_waiters();
        Ok(())
    }

    async fn purge_queue(&self, queue_url: &QueueUrl) -> Result<(), QueueError> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        let queue = storage.queue_mut(queue_url)?;
        queue.messages.clear();
        queue.in_flight.clear();
        Ok(())
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &QueueUrl,
    ) -> Result<HashMap<String, String>, QueueError> {
        let mut storage = self.storage.write().map_err(|_| poisoned())?;
        let visibility = storage.config.default_visibility_timeout_seconds;
        let queue = storage.queue_mut(queue_url)?;
        queue.reclaim_expired(Instant::now());

        let mut attributes = HashMap::new();
        attributes.insert(
            "ApproximateNumberOfMessages".to_string(),
            queue.messages.len().to_string(),
        );
        attributes.insert(
            "ApproximateNumberOfMessagesNotVisible".to_string(),
            queue.in_flight.len().to_string(),
        );
        attributes.insert("VisibilityTimeout".to_string(), visibility.to_string());
        attributes.insert(
            "CreatedTimestamp".to_string(),
            queue.created_at.timestamp().to_string(),
        );

        Ok(attributes)
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
