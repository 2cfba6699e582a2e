//! Listener and retry configuration.
//!
//! All structs carry serde defaults so a partially specified configuration
//! file still produces a usable value; `validate()` rejects combinations the
//! transport or the retry processor would refuse.

use crate::backoff::BackoffPolicy;
use crate::retry::RetryMode;
use queue_runtime::{ConfigurationError, QueueUrl, ReceiveOptions, MAX_RECEIVE_BATCH, MAX_WAIT_TIME};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

// ============================================================================
// Listener Configuration
// ============================================================================

/// Polling behaviour shared by every listener of a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Messages requested per receive call (1-10)
    pub max_messages: u32,

    /// Long-poll wait per receive call
    pub wait_time_seconds: u64,

    /// How long received messages stay hidden while being processed
    pub visibility_timeout_seconds: u64,

    /// Pause after an empty receive
    pub idle_interval_ms: u64,

    /// Pause after the first failed receive; doubles on each further failure
    pub error_backoff_initial_ms: u64,

    /// Upper bound on the pause between failed receives
    pub error_backoff_max_ms: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_messages: MAX_RECEIVE_BATCH,
            wait_time_seconds: MAX_WAIT_TIME.as_secs(),
            visibility_timeout_seconds: 30,
            idle_interval_ms: 1000,
            error_backoff_initial_ms: 1000,
            error_backoff_max_ms: 30_000,
        }
    }
}

impl ListenerConfig {
    /// Check the settings against transport limits
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.receive_options()
            .validate()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("listener: {}", e),
            })?;

        if self.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::Invalid {
                message: "listener: visibility_timeout_seconds must be greater than zero"
                    .to_string(),
            });
        }

        if self.error_backoff_initial_ms > self.error_backoff_max_ms {
            return Err(ConfigurationError::Invalid {
                message: "listener: error_backoff_initial_ms must not exceed error_backoff_max_ms"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Options passed to every receive call
    pub fn receive_options(&self) -> ReceiveOptions {
        ReceiveOptions::new()
            .with_max_messages(self.max_messages)
            .with_wait_time(Duration::from_secs(self.wait_time_seconds))
            .with_visibility_timeout(Duration::from_secs(self.visibility_timeout_seconds))
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    /// Backoff applied between consecutive failed receives
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.error_backoff_initial_ms),
            Duration::from_millis(self.error_backoff_max_ms),
            2.0,
        )
    }
}

// ============================================================================
// Retry Configuration
// ============================================================================

/// How failures below the retry limit are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Leave the message for transport redelivery; the retry count is owned
    /// by whoever produces the message
    #[default]
    ExternallyManaged,

    /// Re-send a copy with an incremented retry count and acknowledge the
    /// original
    Resubmit,
}

impl RetryStrategy {
    /// Resolve the strategy for one source queue
    pub fn into_mode(self, source_queue: &QueueUrl) -> RetryMode {
        match self {
            Self::ExternallyManaged => RetryMode::ExternallyManaged,
            Self::Resubmit => RetryMode::Resubmit {
                source_queue: source_queue.clone(),
            },
        }
    }
}

/// Retry and dead-letter settings
///
/// Retry handling is only enabled when a dead-letter queue is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failures tolerated before a message is dead-lettered
    pub max_retries: i64,

    pub dead_letter_queue_url: Option<String>,

    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            dead_letter_queue_url: None,
            strategy: RetryStrategy::default(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_retries < 0 {
            return Err(ConfigurationError::Invalid {
                message: "retry: max_retries must not be negative".to_string(),
            });
        }

        if let Some(url) = &self.dead_letter_queue_url {
            QueueUrl::new(url.as_str()).map_err(|e| ConfigurationError::Invalid {
                message: format!("retry: dead_letter_queue_url: {}", e),
            })?;
        }

        Ok(())
    }

    /// Whether failed messages should be wrapped with retry handling
    pub fn is_enabled(&self) -> bool {
        self.dead_letter_queue_url.is_some()
    }
}
