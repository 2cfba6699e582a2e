//! Listener start-up and shutdown.

use crate::config::{ServiceConfig, ServiceConfigError};
use queue_listener_core::{
    ListenerError, LoggingProcessor, MessageProcessor, QueueListenerManager, QueueManager,
    RetryConfig, RetryableProcessor,
};
use queue_runtime::{QueueError, QueueTransport, QueueUrl};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

/// Errors that stop the service from starting
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Configuration(#[from] ServiceConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] QueueError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl ServiceError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Transport(_) => 1,
            Self::Listener(_) => 2,
            Self::Configuration(_) => 3,
            Self::Signal(_) => 4,
        }
    }
}

/// Running listeners for every configured queue
pub struct ListenerService {
    manager: QueueListenerManager,
    queues: Vec<QueueUrl>,
    shutdown_timeout: Duration,
}

impl ListenerService {
    /// Create the configured queues and start listening on each
    ///
    /// Queues are created if missing. When a dead-letter queue is configured
    /// it is created too, and every queue's processor is wrapped with retry
    /// handling. If any listener fails to start, the ones already started are
    /// cancelled.
    pub async fn start(
        config: &ServiceConfig,
        transport: Arc<dyn QueueTransport>,
    ) -> Result<Self, ServiceError> {
        let queue_manager = QueueManager::new(Arc::clone(&transport));

        let dead_letter_queue = match &config.retry.dead_letter_queue_url {
            Some(url) => Some(ensure_dead_letter_queue(&queue_manager, url).await?),
            None => None,
        };

        let manager = QueueListenerManager::new(Arc::clone(&transport), config.listener.clone())?;
        let mut queues = Vec::with_capacity(config.queues.len());

        for name in &config.queues {
            let queue_url = queue_manager.create_queue(name).await?;
            let processor = build_processor(
                &config.retry,
                &transport,
                dead_letter_queue.as_ref(),
                &queue_url,
            )?;
            manager.register_processor(queue_url.as_str(), processor)?;
            queues.push(queue_url);
        }

        for queue_url in &queues {
            manager.start_listening(queue_url.as_str())?;
        }

        info!(
            provider = %transport.provider_type(),
            queue_count = queues.len(),
            retry_enabled = dead_letter_queue.is_some(),
            "Listener service started"
        );

        Ok(Self {
            manager,
            queues,
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub fn manager(&self) -> &QueueListenerManager {
        &self.manager
    }

    /// URLs of the queues being listened to, in configuration order
    pub fn queues(&self) -> &[QueueUrl] {
        &self.queues
    }

    /// Stop every listener, returning the queues that did not exit in time
    pub async fn shutdown(self) -> Vec<QueueUrl> {
        self.manager.shutdown(self.shutdown_timeout).await
    }
}

/// Build the processor for one source queue
///
/// Returns a [`LoggingProcessor`], wrapped in a [`RetryableProcessor`] when a
/// dead-letter queue is given.
pub fn build_processor(
    retry: &RetryConfig,
    transport: &Arc<dyn QueueTransport>,
    dead_letter_queue: Option<&QueueUrl>,
    source_queue: &QueueUrl,
) -> Result<Arc<dyn MessageProcessor>, ListenerError> {
    let delegate: Arc<dyn MessageProcessor> = Arc::new(LoggingProcessor);

    let Some(dead_letter_queue) = dead_letter_queue else {
        return Ok(delegate);
    };

    let processor = RetryableProcessor::builder()
        .transport(Arc::clone(transport))
        .dead_letter_queue(dead_letter_queue.as_str())
        .max_retries(retry.max_retries)
        .delegate(delegate)
        .mode(retry.strategy.into_mode(source_queue))
        .build()?;

    Ok(Arc::new(processor))
}

/// Create the dead-letter queue named by the last segment of its URL
async fn ensure_dead_letter_queue(
    queue_manager: &QueueManager,
    configured_url: &str,
) -> Result<QueueUrl, QueueError> {
    let configured = QueueUrl::new(configured_url)?;
    let created = queue_manager.create_queue(configured.queue_name()).await?;

    if created != configured {
        warn!(
            configured = %configured,
            created = %created,
            "Dead-letter queue URL differs from configuration, using the created queue"
        );
    }

    Ok(created)
}
