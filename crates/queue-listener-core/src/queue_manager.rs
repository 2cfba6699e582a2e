//! Administrative queue operations.
//!
//! Thin logging wrapper over the transport's create/delete/purge/attribute
//! calls. Errors from the transport are returned unchanged.

use queue_runtime::{QueueError, QueueName, QueueTransport, QueueUrl};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

#[cfg(test)]
#[path = "queue_manager_tests.rs"]
mod tests;

/// Administrative access to queues on a transport
#[derive(Clone)]
pub struct QueueManager {
    transport: Arc<dyn QueueTransport>,
}

impl QueueManager {
    pub fn new(transport: Arc<dyn QueueTransport>) -> Self {
        Self { transport }
    }

    /// Create a queue and return its URL
    ///
    /// Creating a queue that already exists returns its URL.
    pub async fn create_queue(&self, name: &str) -> Result<QueueUrl, QueueError> {
        let name = QueueName::new(name.to_string())?;
        info!(queue_name = %name, "Creating queue");

        match self.transport.create_queue(&name).await {
            Ok(queue_url) => {
                info!(queue_name = %name, queue_url = %queue_url, "Queue created");
                Ok(queue_url)
            }
            Err(e) => {
                error!(queue_name = %name, error = %e, "Failed to create queue");
                Err(e)
            }
        }
    }

    /// Delete a queue and every message in it
    pub async fn delete_queue(&self, queue_url: &str) -> Result<(), QueueError> {
        let queue_url = QueueUrl::new(queue_url)?;
        info!(queue_url = %queue_url, "Deleting queue");

        match self.transport.delete_queue(&queue_url).await {
            Ok(()) => {
                info!(queue_url = %queue_url, "Queue deleted");
                Ok(())
            }
            Err(e) => {
                error!(queue_url = %queue_url, error = %e, "Failed to delete queue");
                Err(e)
            }
        }
    }

    /// Remove every message from a queue
    pub async fn purge_queue(&self, queue_url: &str) -> Result<(), QueueError> {
        let queue_url = QueueUrl::new(queue_url)?;
        info!(queue_url = %queue_url, "Purging queue");

        match self.transport.purge_queue(&queue_url).await {
            Ok(()) => {
                info!(queue_url = %queue_url, "Queue purged");
                Ok(())
            }
            Err(e) => {
                error!(queue_url = %queue_url, error = %e, "Failed to purge queue");
                Err(e)
            }
        }
    }

    /// Fetch the transport's attributes for a queue
    pub async fn get_attributes(
        &self,
        queue_url: &str,
    ) -> Result<HashMap<String, String>, QueueError> {
        let queue_url = QueueUrl::new(queue_url)?;
        info!(queue_url = %queue_url, "Fetching queue attributes");

        match self.transport.get_queue_attributes(&queue_url).await {
            Ok(attributes) => {
                info!(
                    queue_url = %queue_url,
                    attribute_count = attributes.len(),
                    "Fetched queue attributes"
                );
                Ok(attributes)
            }
            Err(e) => {
                error!(queue_url = %queue_url, error = %e, "Failed to fetch queue attributes");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("provider", &self.transport.provider_type())
            .finish()
    }
}
