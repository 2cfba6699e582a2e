//! Service configuration and layered loading.
//!
//! Sources, applied in order with later ones overriding earlier ones:
//!
//! 1. `/etc/queue-listener/service.yaml`
//! 2. `./config/service.yaml`
//! 3. The file named by `QL_CONFIG_FILE`, which must exist when set
//! 4. Environment variables prefixed `QL__` with `__` between path segments,
//!    e.g. `QL__LISTENER__MAX_MESSAGES=5` sets `listener.max_messages`
//!
//! Every field carries a default, so missing files are not an error. A file
//! that cannot be parsed or a value of the wrong type is.

use config::{Environment, File, FileFormat};
use queue_listener_core::{ListenerConfig, RetryConfig};
use queue_runtime::{ConfigurationError, QueueName, TransportConfig, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "QL_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "QL";

/// Errors raised while loading or validating service configuration
#[derive(Debug, Error)]
pub enum ServiceConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid {section} configuration: {source}")]
    Section {
        section: &'static str,
        source: ConfigurationError,
    },

    #[error("No queues configured")]
    NoQueues,

    #[error("Invalid queue name '{name}': {source}")]
    InvalidQueueName {
        name: String,
        source: ValidationError,
    },

    #[error("Queue '{name}' is configured more than once")]
    DuplicateQueue { name: String },

    #[error("Invalid log level '{level}'")]
    InvalidLogLevel { level: String },

    #[error("shutdown_timeout_seconds must be greater than zero")]
    ZeroShutdownTimeout,
}

// ============================================================================
// Configuration
// ============================================================================

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Queue provider and its connection settings
    pub transport: TransportConfig,

    /// Polling behaviour shared by all listeners
    pub listener: ListenerConfig,

    /// Retry and dead-letter handling; disabled without a dead-letter queue
    pub retry: RetryConfig,

    /// Names of the queues to listen on; created at start-up if missing
    pub queues: Vec<String>,

    pub logging: LoggingConfig,

    /// How long to wait for listeners to exit on shutdown
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            listener: ListenerConfig::default(),
            retry: RetryConfig::default(),
            queues: Vec::new(),
            logging: LoggingConfig::default(),
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level applied to the service crates when `RUST_LOG` is not set
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl ServiceConfig {
    /// Load from the standard sources, honouring `QL_CONFIG_FILE`
    pub fn load() -> Result<Self, ServiceConfigError> {
        let explicit_path = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .filter(|path| !path.trim().is_empty());

        Self::load_from(explicit_path.as_deref())
    }

    /// Load from the standard sources plus an optional required file
    pub fn load_from(explicit_path: Option<&str>) -> Result<Self, ServiceConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                File::with_name("/etc/queue-listener/service")
                    .required(false)
                    .format(FileFormat::Yaml),
            )
            .add_source(
                File::with_name("config/service")
                    .required(false)
                    .format(FileFormat::Yaml),
            );

        if let Some(path) = explicit_path {
            info!(path = %path, "Loading configuration from explicit path");
            builder = builder.add_source(
                File::with_name(path)
                    .required(true)
                    .format(FileFormat::Yaml),
            );
        }

        let config: ServiceConfig = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every section and the queue list
    pub fn validate(&self) -> Result<(), ServiceConfigError> {
        self.transport
            .validate()
            .map_err(|source| ServiceConfigError::Section {
                section: "transport",
                source,
            })?;
        self.listener
            .validate()
            .map_err(|source| ServiceConfigError::Section {
                section: "listener",
                source,
            })?;
        self.retry
            .validate()
            .map_err(|source| ServiceConfigError::Section {
                section: "retry",
                source,
            })?;

        if self.queues.is_empty() {
            return Err(ServiceConfigError::NoQueues);
        }

        let mut seen = HashSet::new();
        for name in &self.queues {
            QueueName::new(name.clone()).map_err(|source| {
                ServiceConfigError::InvalidQueueName {
                    name: name.clone(),
                    source,
                }
            })?;
            if !seen.insert(name.as_str()) {
                return Err(ServiceConfigError::DuplicateQueue { name: name.clone() });
            }
        }

        if self.logging.level.parse::<LevelFilter>().is_err() {
            return Err(ServiceConfigError::InvalidLogLevel {
                level: self.logging.level.clone(),
            });
        }

        if self.shutdown_timeout_seconds == 0 {
            return Err(ServiceConfigError::ZeroShutdownTimeout);
        }

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}
