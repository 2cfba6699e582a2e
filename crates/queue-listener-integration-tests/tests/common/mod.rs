//! Common test utilities for queue listener integration tests
//!
//! This module provides:
//! - An in-memory transport with short timeouts
//! - A recording processor whose failures can be scripted per body
//! - Polling helpers for asynchronous assertions

use async_trait::async_trait;
use queue_listener_core::{ListenerConfig, MessageProcessor, ProcessingError};
use queue_runtime::{
    InMemoryConfig, InMemoryProvider, OutgoingMessage, QueueTransport, QueueUrl, ReceivedMessage,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};

// ============================================================================
// Transport and configuration
// ============================================================================

/// In-memory transport shared by producer and listeners
pub fn create_transport() -> Arc<dyn QueueTransport> {
    Arc::new(InMemoryProvider::new(InMemoryConfig::default()))
}

/// Listener configuration that polls quickly and hides messages for one second
pub fn fast_listener_config() -> ListenerConfig {
    ListenerConfig {
        max_messages: 10,
        wait_time_seconds: 1,
        visibility_timeout_seconds: 1,
        idle_interval_ms: 10,
        error_backoff_initial_ms: 10,
        error_backoff_max_ms: 100,
    }
}

#[allow(dead_code)]
pub async fn send(transport: &Arc<dyn QueueTransport>, queue_url: &QueueUrl, body: &str) {
    transport
        .send_message(queue_url, &OutgoingMessage::new(body))
        .await
        .unwrap();
}

/// Approximate visible and in-flight message counts
#[allow(dead_code)]
pub async fn message_counts(
    transport: &Arc<dyn QueueTransport>,
    queue_url: &QueueUrl,
) -> (usize, usize) {
    let attributes = transport.get_queue_attributes(queue_url).await.unwrap();
    let count = |name: &str| attributes[name].parse::<usize>().unwrap();
    (
        count("ApproximateNumberOfMessages"),
        count("ApproximateNumberOfMessagesNotVisible"),
    )
}

/// Poll `condition` until it holds or `timeout` passes
#[allow(dead_code)]
pub async fn wait_for<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Poll the queue until it holds no messages at all
#[allow(dead_code)]
pub async fn wait_for_empty(
    transport: &Arc<dyn QueueTransport>,
    queue_url: &QueueUrl,
    timeout: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if message_counts(transport, queue_url).await == (0, 0) {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    false
}

// ============================================================================
// Recording Processor
// ============================================================================

/// Processor that records every delivery and fails bodies on request
#[derive(Clone, Default)]
pub struct RecordingProcessor {
    deliveries: Arc<Mutex<Vec<ReceivedMessage>>>,
    failures_remaining: Arc<Mutex<HashMap<String, usize>>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` deliveries of `body`
    #[allow(dead_code)]
    pub fn fail_times(&self, body: &str, times: usize) {
        self.failures_remaining
            .lock()
            .unwrap()
            .insert(body.to_string(), times);
    }

    /// Fail every delivery of `body`
    #[allow(dead_code)]
    pub fn fail_always(&self, body: &str) {
        self.fail_times(body, usize::MAX);
    }

    #[allow(dead_code)]
    pub fn deliveries(&self) -> Vec<ReceivedMessage> {
        self.deliveries.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn bodies(&self) -> Vec<String> {
        self.deliveries().into_iter().map(|m| m.body).collect()
    }

    #[allow(dead_code)]
    pub fn delivery_count(&self) -> usize {
        self.deliveries.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageProcessor for RecordingProcessor {
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        self.deliveries.lock().unwrap().push(message.clone());

        let mut failures = self.failures_remaining.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&message.body) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow::anyhow!("scripted failure for {}", message.body).into());
            }
        }
        Ok(())
    }
}
