//! Provider types and configuration.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AwsSqs,
    InMemory,
}

impl ProviderType {
    /// Get maximum message size for provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AwsSqs => 256 * 1024,         // 256KB
            Self::InMemory => 10 * 1024 * 1024, // 10MB
        }
    }

    /// Name used in error reports and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwsSqs => "AwsSqs",
            Self::InMemory => "InMemory",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-specific transport configuration
///
/// Deserializes from a tagged map, e.g.
///
/// ```yaml
/// type: aws_sqs
/// region: eu-west-1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportConfig {
    AwsSqs(AwsSqsConfig),
    InMemory(InMemoryConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::InMemory(InMemoryConfig::default())
    }
}

impl TransportConfig {
    /// Provider selected by this configuration
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::AwsSqs(_) => ProviderType::AwsSqs,
            Self::InMemory(_) => ProviderType::InMemory,
        }
    }

    /// Validate the provider-specific settings
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        match self {
            Self::AwsSqs(config) => config.validate(),
            Self::InMemory(config) => config.validate(),
        }
    }
}

/// AWS SQS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsSqsConfig {
    pub region: String,
    /// Override for the service endpoint (LocalStack, ElasticMQ, VPC endpoints)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    /// HTTP timeout; must exceed the longest long-poll wait
    pub request_timeout_seconds: u64,
}

impl Default for AwsSqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            request_timeout_seconds: 30,
        }
    }
}

impl AwsSqsConfig {
    /// Check that the region is set and the timeout covers a full long poll
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "region".to_string(),
            });
        }

        if self.request_timeout_seconds <= crate::message::MAX_WAIT_TIME.as_secs() {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "request_timeout_seconds must exceed the {}s long-poll wait",
                    crate::message::MAX_WAIT_TIME.as_secs()
                ),
            });
        }

        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigurationError::Invalid {
                message: "access_key_id and secret_access_key must be set together".to_string(),
            });
        }

        Ok(())
    }
}

/// In-memory provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Prefix for queue URLs handed out by `create_queue`
    pub base_url: String,
    pub max_queue_size: usize,
    /// Queue attribute reported as `VisibilityTimeout`
    pub default_visibility_timeout_seconds: u64,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            base_url: "memory://localhost".to_string(),
            max_queue_size: 10000,
            default_visibility_timeout_seconds: 30,
        }
    }
}

impl InMemoryConfig {
    /// Check the base URL and capacity
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "base_url".to_string(),
            });
        }

        if self.max_queue_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "max_queue_size must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
