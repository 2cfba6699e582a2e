//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueTransport`
//! trait for different queue backends.

pub mod aws;
pub mod memory;

pub use aws::{AwsError, AwsSqsProvider, MAX_MESSAGE_ATTRIBUTES};
pub use memory::InMemoryProvider;
