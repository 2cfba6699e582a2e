//! Tracing subscriber initialization.

use crate::config::LoggingConfig;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

/// Filter directives used when `RUST_LOG` is not set
pub fn default_directives(level: &str) -> String {
    ["queue_listener_service", "queue_listener_core", "queue_runtime"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(&config.level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}
