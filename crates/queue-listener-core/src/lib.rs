//! # Queue Listener Core
//!
//! Asynchronous consumption of messages from a [`queue_runtime`] transport.
//!
//! This crate provides:
//! - [`QueueListenerManager`], which runs one long-polling worker per queue
//!   and deletes every message its processor handles successfully
//! - [`MessageProcessor`], the capability listeners dispatch to, with a JSON
//!   reference implementation
//! - [`RetryableProcessor`], which bounds retries per message and forwards
//!   exhausted messages to a dead-letter queue
//! - [`QueueManager`] for queue administration
//!
//! Delivery is at-least-once. Processors must tolerate duplicates.
//!
//! ## Usage
//!
//! ```rust
//! use queue_listener_core::{
//!     JsonMessageProcessor, ListenerConfig, ProcessingError, QueueListenerManager, QueueManager,
//! };
//! use queue_runtime::TransportFactory;
//! use serde::Deserialize;
//! use std::sync::Arc;
//!
//! #[derive(Deserialize)]
//! struct OrderPlaced {
//!     order_id: String,
//! }
//!
//! # tokio_test::block_on(async {
//! let transport = TransportFactory::create_test_transport();
//! let queue_url = QueueManager::new(transport.clone())
//!     .create_queue("orders")
//!     .await
//!     .unwrap();
//!
//! let manager = QueueListenerManager::new(transport, ListenerConfig::default()).unwrap();
//! let processor = JsonMessageProcessor::new(|order: OrderPlaced| async move {
//!     tracing::info!(order_id = %order.order_id, "Order received");
//!     Ok::<(), ProcessingError>(())
//! });
//!
//! manager
//!     .register_processor(queue_url.as_str(), Arc::new(processor))
//!     .unwrap();
//! manager.start_listening(queue_url.as_str()).unwrap();
//! manager.shutdown(std::time::Duration::from_secs(1)).await;
//! # });
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod listener;
pub mod processor;
pub mod queue_manager;
pub mod retry;

pub use backoff::{BackoffPolicy, BackoffState};
pub use config::{ListenerConfig, RetryConfig, RetryStrategy};
pub use error::{ListenerError, ProcessingError};
pub use listener::{BatchReport, MessageOutcome, QueueListenerManager};
pub use processor::{parse_body, JsonMessageProcessor, LoggingProcessor, MessageProcessor};
pub use queue_manager::QueueManager;
pub use retry::{
    retry_count, RetryMode, RetryOutcome, RetryableProcessor, RetryableProcessorBuilder,
    ERROR_MESSAGE_ATTRIBUTE, ERROR_TYPE_ATTRIBUTE, RETRY_COUNT_ATTRIBUTE,
};
