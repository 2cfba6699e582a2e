//! # Retryable Processor
//!
//! Wraps a [`MessageProcessor`] with a bounded retry budget. Each message
//! carries its own retry count in the [`RETRY_COUNT_ATTRIBUTE`] attribute;
//! once a failing message has used up the budget it is forwarded to a
//! dead-letter queue and acknowledged so it leaves the main queue.
//!
//! Below the budget, [`RetryMode`] decides who advances the retry count:
//!
//! - [`RetryMode::ExternallyManaged`] leaves the message on the queue for
//!   transport redelivery and never touches the attribute. The count only
//!   grows if the producer or a transport-side redrive policy updates it.
//! - [`RetryMode::Resubmit`] sends a copy with the count incremented and
//!   acknowledges the original, so the budget is consumed by this processor.

use crate::error::{ListenerError, ProcessingError};
use crate::processor::MessageProcessor;
use async_trait::async_trait;
use queue_runtime::{MessageId, QueueError, QueueTransport, QueueUrl, ReceivedMessage};
use std::sync::Arc;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;

/// Attribute holding how many times a message has been retried
pub const RETRY_COUNT_ATTRIBUTE: &str = "RetryCount";

/// Attribute on dead-lettered messages holding the last failure's message
pub const ERROR_MESSAGE_ATTRIBUTE: &str = "ErrorMessage";

/// Attribute on dead-lettered messages holding the last failure's category
pub const ERROR_TYPE_ATTRIBUTE: &str = "ErrorType";

/// Read the retry count of a message
///
/// Absent or malformed values count as zero; a malformed value is logged.
pub fn retry_count(message: &ReceivedMessage) -> u32 {
    let Some(raw) = message.attribute(RETRY_COUNT_ATTRIBUTE) else {
        return 0;
    };

    match raw.trim().parse::<u32>() {
        Ok(count) => count,
        Err(e) => {
            warn!(
                message_id = %message.message_id,
                value = raw,
                error = %e,
                "Malformed retry count attribute, treating as 0"
            );
            0
        }
    }
}

// ============================================================================
// Retry Mode and Outcome
// ============================================================================

/// Handling of a failure that is still within the retry budget
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RetryMode {
    /// Return the failure so the message is redelivered by the transport
    #[default]
    ExternallyManaged,

    /// Send a copy with an incremented retry count to `source_queue` and
    /// acknowledge the original
    Resubmit { source_queue: QueueUrl },
}

/// What the retry processor did with one message
#[derive(Debug)]
pub enum RetryOutcome {
    /// The delegate processed the message
    Succeeded,

    /// The delegate failed within budget; the message stays on the queue
    RetryPending {
        retry_count: u32,
        error: ProcessingError,
    },

    /// The delegate failed within budget and a copy carrying `retry_count`
    /// was queued
    Resubmitted { retry_count: u32 },

    /// Resubmitting failed; the message stays on the queue
    ResubmitFailed {
        retry_count: u32,
        error: ProcessingError,
    },

    /// The budget was exhausted and the message was dead-lettered
    DeadLettered { retry_count: u32 },

    /// The budget was exhausted but the dead-letter send failed; the message
    /// is dropped
    DeadLetterFailed { retry_count: u32 },
}

impl RetryOutcome {
    /// Whether the original delivery should be acknowledged
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Self::RetryPending { .. } | Self::ResubmitFailed { .. })
    }

    /// Convert into the result reported to the listener
    pub fn into_result(self) -> Result<(), ProcessingError> {
        match self {
            Self::RetryPending { error, .. } | Self::ResubmitFailed { error, .. } => Err(error),
            Self::Succeeded
            | Self::Resubmitted { .. }
            | Self::DeadLettered { .. }
            | Self::DeadLetterFailed { .. } => Ok(()),
        }
    }
}

// ============================================================================
// Retryable Processor
// ============================================================================

/// Processor decorator adding bounded retries and dead-letter escalation
///
/// # Examples
///
/// ```rust
/// use queue_listener_core::{LoggingProcessor, RetryableProcessor};
/// use queue_runtime::TransportFactory;
/// use std::sync::Arc;
///
/// let processor = RetryableProcessor::builder()
///     .transport(TransportFactory::create_test_transport())
///     .dead_letter_queue("memory://localhost/orders-dlq")
///     .max_retries(3)
///     .delegate(Arc::new(LoggingProcessor))
///     .build()
///     .unwrap();
///
/// assert_eq!(processor.max_retries(), 3);
/// ```
pub struct RetryableProcessor {
    transport: Arc<dyn QueueTransport>,
    dead_letter_queue: QueueUrl,
    max_retries: u32,
    delegate: Arc<dyn MessageProcessor>,
    mode: RetryMode,
}

impl std::fmt::Debug for RetryableProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryableProcessor")
            .field("provider", &self.transport.provider_type())
            .field("dead_letter_queue", &self.dead_letter_queue)
            .field("max_retries", &self.max_retries)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl RetryableProcessor {
    /// Start building a retry processor
    pub fn builder() -> RetryableProcessorBuilder {
        RetryableProcessorBuilder::default()
    }

    pub fn dead_letter_queue(&self) -> &QueueUrl {
        &self.dead_letter_queue
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn mode(&self) -> &RetryMode {
        &self.mode
    }

    /// Run the delegate and apply the retry policy to its result
    pub async fn handle(&self, message: &ReceivedMessage) -> RetryOutcome {
        let error = match self.delegate.process(message).await {
            Ok(()) => return RetryOutcome::Succeeded,
            Err(e) => e,
        };

        let retry_count = retry_count(message);

        if retry_count >= self.max_retries {
            warn!(
                message_id = %message.message_id,
                retry_count = retry_count,
                max_retries = self.max_retries,
                error = %error,
                "Retry budget exhausted, sending message to dead-letter queue"
            );

            return match self.send_to_dead_letter(Some(message), &error).await {
                Ok(_) => RetryOutcome::DeadLettered { retry_count },
                Err(e) => {
                    error!(
                        message_id = %message.message_id,
                        dead_letter_queue = %self.dead_letter_queue,
                        error = %e,
                        "Failed to send message to dead-letter queue, message will be dropped"
                    );
                    RetryOutcome::DeadLetterFailed { retry_count }
                }
            };
        }

        match &self.mode {
            RetryMode::ExternallyManaged => {
                info!(
                    message_id = %message.message_id,
                    retry_count = retry_count,
                    max_retries = self.max_retries,
                    error = %error,
                    "Message processing failed, will retry after visibility timeout"
                );
                RetryOutcome::RetryPending { retry_count, error }
            }
            RetryMode::Resubmit { source_queue } => {
                let next_count = retry_count + 1;
                let copy = message
                    .to_outgoing()
                    .with_attribute(RETRY_COUNT_ATTRIBUTE, next_count.to_string());

                match self.transport.send_message(source_queue, &copy).await {
                    Ok(new_id) => {
                        info!(
                            message_id = %message.message_id,
                            new_message_id = %new_id,
                            retry_count = next_count,
                            max_retries = self.max_retries,
                            error = %error,
                            "Message processing failed, resubmitted for retry"
                        );
                        RetryOutcome::Resubmitted {
                            retry_count: next_count,
                        }
                    }
                    Err(e) => {
                        warn!(
                            message_id = %message.message_id,
                            source_queue = %source_queue,
                            error = %e,
                            "Failed to resubmit message, leaving it for redelivery"
                        );
                        RetryOutcome::ResubmitFailed { retry_count, error }
                    }
                }
            }
        }
    }

    /// Forward a message to the dead-letter queue
    ///
    /// The copy keeps the original body and attributes and adds
    /// [`ERROR_MESSAGE_ATTRIBUTE`], [`ERROR_TYPE_ATTRIBUTE`] and
    /// [`RETRY_COUNT_ATTRIBUTE`]. Passing `None` does nothing and returns
    /// `Ok(None)`.
    ///
    /// SQS accepts at most [`queue_runtime::MAX_MESSAGE_ATTRIBUTES`] message
    /// attributes. When the original attributes plus the three added here
    /// exceed that, the send fails with `QueueError::ValidationError`.
    pub async fn send_to_dead_letter(
        &self,
        message: Option<&ReceivedMessage>,
        cause: &ProcessingError,
    ) -> Result<Option<MessageId>, QueueError> {
        let Some(message) = message else {
            return Ok(None);
        };

        let dead_letter = message
            .to_outgoing()
            .with_attribute(ERROR_MESSAGE_ATTRIBUTE, cause.to_string())
            .with_attribute(ERROR_TYPE_ATTRIBUTE, cause.error_type())
            .with_attribute(RETRY_COUNT_ATTRIBUTE, retry_count(message).to_string());

        let id = self
            .transport
            .send_message(&self.dead_letter_queue, &dead_letter)
            .await?;

        info!(
            message_id = %message.message_id,
            dead_letter_message_id = %id,
            dead_letter_queue = %self.dead_letter_queue,
            error_type = cause.error_type(),
            "Message sent to dead-letter queue"
        );

        Ok(Some(id))
    }
}

#[async_trait]
impl MessageProcessor for RetryableProcessor {
    async fn process(&self, message: &ReceivedMessage) -> Result<(), ProcessingError> {
        self.handle(message).await.into_result()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder validating every [`RetryableProcessor`] dependency up front
#[derive(Default)]
pub struct RetryableProcessorBuilder {
    transport: Option<Arc<dyn QueueTransport>>,
    dead_letter_queue: Option<String>,
    max_retries: Option<i64>,
    delegate: Option<Arc<dyn MessageProcessor>>,
    mode: RetryMode,
}

impl RetryableProcessorBuilder {
    /// Transport used for dead-letter and resubmit sends
    pub fn transport(mut self, transport: Arc<dyn QueueTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn dead_letter_queue(mut self, queue_url: impl Into<String>) -> Self {
        self.dead_letter_queue = Some(queue_url.into());
        self
    }

    /// Failures tolerated before dead-lettering; must not be negative
    pub fn max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn MessageProcessor>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Below-budget failure handling, [`RetryMode::ExternallyManaged`] by default
    pub fn mode(mut self, mode: RetryMode) -> Self {
        self.mode = mode;
        self
    }

    /// Validate the settings and build the processor
    ///
    /// # Errors
    ///
    /// [`ListenerError::InvalidArgument`] when the transport, dead-letter
    /// queue, max retries or delegate is missing or invalid.
    pub fn build(self) -> Result<RetryableProcessor, ListenerError> {
        let transport = self
            .transport
            .ok_or_else(|| ListenerError::invalid_argument("transport", "transport is required"))?;

        let dead_letter_queue = self.dead_letter_queue.ok_or_else(|| {
            ListenerError::invalid_argument("dead_letter_queue", "dead-letter queue is required")
        })?;
        let dead_letter_queue = QueueUrl::new(dead_letter_queue)
            .map_err(|e| ListenerError::invalid_argument("dead_letter_queue", e.to_string()))?;

        let max_retries = self.max_retries.ok_or_else(|| {
            ListenerError::invalid_argument("max_retries", "max retries is required")
        })?;
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            ListenerError::invalid_argument(
                "max_retries",
                format!("must be between 0 and {}, got {}", u32::MAX, max_retries),
            )
        })?;

        let delegate = self
            .delegate
            .ok_or_else(|| ListenerError::invalid_argument("delegate", "delegate is required"))?;

        if let RetryMode::Resubmit { source_queue } = &self.mode {
            if source_queue == &dead_letter_queue {
                return Err(ListenerError::invalid_argument(
                    "mode",
                    "resubmit queue must differ from the dead-letter queue",
                ));
            }
        }

        Ok(RetryableProcessor {
            transport,
            dead_letter_queue,
            max_retries,
            delegate,
            mode: self.mode,
        })
    }
}
