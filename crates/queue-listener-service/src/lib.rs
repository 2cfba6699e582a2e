//! # Queue Listener Service
//!
//! Application wiring for running queue listeners as a long-lived process.
//!
//! This library provides:
//! - [`ServiceConfig`], loaded from layered YAML files and `QL__` prefixed
//!   environment variables
//! - [`init_logging`] for the `tracing` subscriber
//! - [`ListenerService`], which creates the configured queues, registers a
//!   processor for each and starts listening
//!
//! The binary in `main.rs` adds signal handling and exit codes.

pub mod config;
pub mod logging;
pub mod service;

pub use crate::config::{
    LoggingConfig, ServiceConfig, ServiceConfigError, CONFIG_FILE_ENV, ENV_PREFIX,
};
pub use logging::{default_directives, init_logging};
pub use service::{build_processor, ListenerService, ServiceError};
