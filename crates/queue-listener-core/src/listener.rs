//! # Queue Listener Manager
//!
//! Owns one polling worker per queue. Each worker is a Tokio task that
//! long-polls the transport, hands messages to the processor registered for
//! its queue and deletes every message that was processed successfully.
//!
//! ## Lifecycle
//!
//! - [`QueueListenerManager::register_processor`] maps a queue URL to a
//!   processor; re-registering replaces it before the next poll.
//! - [`QueueListenerManager::start_listening`] spawns the worker.
//! - [`QueueListenerManager::stop_listening`] cancels the worker without
//!   waiting for it. A pending long poll or idle sleep is abandoned
//!   immediately; a message already being processed may finish, but no new
//!   message is started.
//!
//! ## Failure handling
//!
//! - A processor failure or panic is logged and the message is left for
//!   redelivery. Panics are reported as `ProcessingFailed` with error type
//!   `Panic`.
//! - A failed delete after successful processing is logged and recorded as
//!   [`MessageOutcome::DeleteFailed`]; the message will be redelivered, so
//!   processors must be idempotent.
//! - A failed receive is logged and retried after an exponential backoff.
//!
//! None of these stop the worker.

use crate::backoff::{BackoffPolicy, BackoffState};
use crate::config::ListenerConfig;
use crate::error::ListenerError;
use crate::processor::MessageProcessor;
use futures::FutureExt;
use queue_runtime::{MessageId, QueueTransport, QueueUrl, ReceiveOptions, ReceivedMessage};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;

type ProcessorRegistry = Arc<RwLock<HashMap<QueueUrl, Arc<dyn MessageProcessor>>>>;

// ============================================================================
// Batch Results
// ============================================================================

/// Result of handling one received message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Processed and deleted
    Processed,

    /// The processor failed; the message was not deleted
    ProcessingFailed {
        error_type: &'static str,
        error: String,
    },

    /// Processed, but the delete failed; the message will be redelivered
    DeleteFailed { error: String },

    /// Not attempted because the listener was stopped mid-batch
    Skipped,
}

/// Per-message outcomes of one receive batch, in receive order
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(MessageId, MessageOutcome)>,
}

impl BatchReport {
    fn record(&mut self, message_id: MessageId, outcome: MessageOutcome) {
        self.outcomes.push((message_id, outcome));
    }

    fn count(&self, predicate: impl Fn(&MessageOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| predicate(o)).count()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Processed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::ProcessingFailed { .. }))
    }

    pub fn delete_failed(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::DeleteFailed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, MessageOutcome::Skipped))
    }

    /// Check if every message was processed and deleted
    pub fn is_complete_success(&self) -> bool {
        self.processed() == self.outcomes.len()
    }
}

// ============================================================================
// Listener Manager
// ============================================================================

struct ListenerHandle {
    cancellation: CancellationToken,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    fn is_live(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    fn cancel(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.cancellation.cancel();
    }
}

/// Manages per-queue listeners sharing one transport
///
/// All methods take `&self` and may be called concurrently; the manager is
/// usually held in an `Arc`. Dropping the manager cancels every worker.
///
/// # Examples
///
/// ```rust
/// use queue_listener_core::{ListenerConfig, LoggingProcessor, QueueListenerManager};
/// use queue_runtime::TransportFactory;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let transport = TransportFactory::create_test_transport();
/// let manager = QueueListenerManager::new(transport, ListenerConfig::default()).unwrap();
///
/// manager
///     .register_processor("memory://localhost/orders", Arc::new(LoggingProcessor))
///     .unwrap();
/// manager.start_listening("memory://localhost/orders").unwrap();
/// assert!(manager.is_listening("memory://localhost/orders"));
///
/// manager.stop_listening("memory://localhost/orders").unwrap();
/// assert!(!manager.is_listening("memory://localhost/orders"));
/// # });
/// ```
pub struct QueueListenerManager {
    transport: Arc<dyn QueueTransport>,
    config: ListenerConfig,
    processors: ProcessorRegistry,
    listeners: Mutex<HashMap<QueueUrl, ListenerHandle>>,
}

impl QueueListenerManager {
    /// Create a manager with no processors or listeners
    ///
    /// # Errors
    ///
    /// [`ListenerError::InvalidArgument`] if `config` fails
    /// [`ListenerConfig::validate`].
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        config: ListenerConfig,
    ) -> Result<Self, ListenerError> {
        config
            .validate()
            .map_err(|e| ListenerError::invalid_argument("config", e.to_string()))?;

        Ok(Self {
            transport,
            config,
            processors: Arc::new(RwLock::new(HashMap::new())),
            listeners: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Register the processor for a queue, replacing any previous one
    ///
    /// A running listener picks up the new processor on its next poll.
    ///
    /// # Errors
    ///
    /// [`ListenerError::InvalidArgument`] if the URL is empty.
    pub fn register_processor(
        &self,
        queue_url: &str,
        processor: Arc<dyn MessageProcessor>,
    ) -> Result<(), ListenerError> {
        let queue_url = QueueUrl::new(queue_url)?;

        let previous = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(queue_url.clone(), processor);

        info!(
            queue_url = %queue_url,
            replaced = previous.is_some(),
            "Registered message processor"
        );
        Ok(())
    }

    /// Spawn a worker for the queue
    ///
    /// The worker is recorded before this returns; the first poll happens
    /// asynchronously.
    ///
    /// # Errors
    ///
    /// - [`ListenerError::InvalidArgument`] if the URL is empty
    /// - [`ListenerError::AlreadyRunning`] if a worker is already active
    /// - [`ListenerError::NoProcessor`] if no processor is registered
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_listening(&self, queue_url: &str) -> Result<(), ListenerError> {
        let queue_url = QueueUrl::new(queue_url)?;
        let mut listeners = self.lock_listeners();

        if let Some(existing) = listeners.get(&queue_url) {
            if existing.is_live() {
                return Err(ListenerError::AlreadyRunning {
                    queue_url: queue_url.to_string(),
                });
            }
            // A worker that died without being stopped is replaced
            warn!(queue_url = %queue_url, "Replacing listener that exited unexpectedly");
            listeners.remove(&queue_url);
        }

        let has_processor = self
            .processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&queue_url);
        if !has_processor {
            return Err(ListenerError::NoProcessor {
                queue_url: queue_url.to_string(),
            });
        }

        let cancellation = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));
        let worker = QueueWorker {
            queue_url: queue_url.clone(),
            transport: Arc::clone(&self.transport),
            processors: Arc::clone(&self.processors),
            receive_options: self.config.receive_options(),
            idle_interval: self.config.idle_interval(),
            backoff_policy: self.config.backoff_policy(),
            cancellation: cancellation.clone(),
            running: Arc::clone(&running),
        };
        let task = tokio::spawn(worker.run());

        listeners.insert(
            queue_url.clone(),
            ListenerHandle {
                cancellation,
                running,
                task,
            },
        );

        info!(queue_url = %queue_url, "Started listening");
        Ok(())
    }

    /// Cancel the worker for a queue without waiting for it to exit
    ///
    /// # Errors
    ///
    /// - [`ListenerError::InvalidArgument`] if the URL is empty
    /// - [`ListenerError::NotRunning`] if no worker is active
    pub fn stop_listening(&self, queue_url: &str) -> Result<(), ListenerError> {
        let queue_url = QueueUrl::new(queue_url)?;
        let handle = self.lock_listeners().remove(&queue_url);

        let Some(handle) = handle else {
            return Err(ListenerError::NotRunning {
                queue_url: queue_url.to_string(),
            });
        };

        let was_live = handle.is_live();
        handle.cancel();

        if !was_live {
            return Err(ListenerError::NotRunning {
                queue_url: queue_url.to_string(),
            });
        }

        info!(queue_url = %queue_url, "Stopped listening");
        Ok(())
    }

    /// Check whether a live worker exists for the queue
    pub fn is_listening(&self, queue_url: &str) -> bool {
        let Ok(queue_url) = QueueUrl::new(queue_url) else {
            return false;
        };

        self.lock_listeners()
            .get(&queue_url)
            .is_some_and(ListenerHandle::is_live)
    }

    /// Stop every active listener, logging individual failures
    pub fn shutdown_all(&self) {
        let queue_urls: Vec<QueueUrl> = self.lock_listeners().keys().cloned().collect();
        info!(count = queue_urls.len(), "Stopping all listeners");

        for queue_url in queue_urls {
            if let Err(e) = self.stop_listening(queue_url.as_str()) {
                warn!(queue_url = %queue_url, error = %e, "Failed to stop listener");
            }
        }
    }

    /// Cancel every listener and wait up to `timeout` for the workers to exit
    ///
    /// Returns the queues whose workers were still running when the timeout
    /// elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> Vec<QueueUrl> {
        let handles: Vec<(QueueUrl, ListenerHandle)> = self.lock_listeners().drain().collect();
        info!(
            count = handles.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Shutting down listeners"
        );

        for (_, handle) in &handles {
            handle.cancel();
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut stragglers = Vec::new();

        for (queue_url, handle) in handles {
            match tokio::time::timeout_at(deadline, handle.task).await {
                Ok(Ok(())) => debug!(queue_url = %queue_url, "Listener exited"),
                Ok(Err(e)) => {
                    error!(queue_url = %queue_url, error = %e, "Listener task failed");
                }
                Err(_) => {
                    warn!(queue_url = %queue_url, "Listener did not exit before shutdown timeout");
                    stragglers.push(queue_url);
                }
            }
        }

        stragglers
    }

    /// Queues with a live worker, sorted
    pub fn active_queues(&self) -> Vec<QueueUrl> {
        let mut queues: Vec<QueueUrl> = self
            .lock_listeners()
            .iter()
            .filter(|(_, handle)| handle.is_live())
            .map(|(url, _)| url.clone())
            .collect();
        queues.sort();
        queues
    }

    /// Queues with a registered processor, sorted
    pub fn registered_queues(&self) -> Vec<QueueUrl> {
        let mut queues: Vec<QueueUrl> = self
            .processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        queues.sort();
        queues
    }

    fn lock_listeners(&self) -> std::sync::MutexGuard<'_, HashMap<QueueUrl, ListenerHandle>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for QueueListenerManager {
    fn drop(&mut self) {
        for handle in self.lock_listeners().values() {
            handle.cancel();
        }
    }
}

// ============================================================================
// Worker
// ============================================================================

/// State owned by one listener task
struct QueueWorker {
    queue_url: QueueUrl,
    transport: Arc<dyn QueueTransport>,
    processors: ProcessorRegistry,
    receive_options: ReceiveOptions,
    idle_interval: Duration,
    backoff_policy: BackoffPolicy,
    cancellation: CancellationToken,
    running: Arc<AtomicBool>,
}

impl QueueWorker {
    async fn run(self) {
        debug!(queue_url = %self.queue_url, "Listener loop started");
        let mut backoff = BackoffState::new();

        while !self.cancellation.is_cancelled() {
            let Some(processor) = self.current_processor() else {
                error!(queue_url = %self.queue_url, "No processor registered, listener exiting");
                break;
            };

            let receive = self.transport.receive_messages(&self.queue_url, &self.receive_options);
            let received = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break,
                result = receive => result,
            };

            match received {
                Ok(messages) if messages.is_empty() => {
                    backoff.reset();
                    if !self.pause(self.idle_interval).await {
                        break;
                    }
                }
                Ok(messages) => {
                    backoff.reset();
                    let report = self.process_batch(processor.as_ref(), messages).await;
                    debug!(
                        queue_url = %self.queue_url,
                        processed = report.processed(),
                        failed = report.failed(),
                        delete_failed = report.delete_failed(),
                        skipped = report.skipped(),
                        "Batch complete"
                    );
                }
                Err(e) => {
                    let delay = backoff.record_failure(&self.backoff_policy);
                    error!(
                        queue_url = %self.queue_url,
                        error = %e,
                        consecutive_failures = backoff.consecutive_failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to receive messages"
                    );
                    if !self.pause(delay).await {
                        break;
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        debug!(queue_url = %self.queue_url, "Listener loop exited");
    }

    /// Look up the processor for this queue; re-read every poll
    fn current_processor(&self) -> Option<Arc<dyn MessageProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&self.queue_url)
            .cloned()
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Process a batch sequentially, isolating each message's outcome
    async fn process_batch(
        &self,
        processor: &dyn MessageProcessor,
        messages: Vec<ReceivedMessage>,
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for message in messages {
            if self.cancellation.is_cancelled() {
                report.record(message.message_id, MessageOutcome::Skipped);
                continue;
            }

            let outcome = self.process_message(processor, &message).await;
            report.record(message.message_id, outcome);
        }

        report
    }

    async fn process_message(
        &self,
        processor: &dyn MessageProcessor,
        message: &ReceivedMessage,
    ) -> MessageOutcome {
        let result = match AssertUnwindSafe(processor.process(message)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(
                    queue_url = %self.queue_url,
                    message_id = %message.message_id,
                    panic = %reason,
                    "Message processor panicked, leaving message for redelivery"
                );
                return MessageOutcome::ProcessingFailed {
                    error_type: "Panic",
                    error: reason.to_string(),
                };
            }
        };

        if let Err(e) = result {
            warn!(
                queue_url = %self.queue_url,
                message_id = %message.message_id,
                error_type = e.error_type(),
                error = %e,
                "Message processing failed, leaving message for redelivery"
            );
            return MessageOutcome::ProcessingFailed {
                error_type: e.error_type(),
                error: e.to_string(),
            };
        }

        match self
            .transport
            .delete_message(&self.queue_url, &message.receipt_handle)
            .await
        {
            Ok(()) => {
                debug!(
                    queue_url = %self.queue_url,
                    message_id = %message.message_id,
                    "Message processed and deleted"
                );
                MessageOutcome::Processed
            }
            Err(e) => {
                error!(
                    queue_url = %self.queue_url,
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to delete processed message, it will be redelivered"
                );
                MessageOutcome::DeleteFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
}
