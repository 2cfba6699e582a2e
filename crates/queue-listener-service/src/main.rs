//! # Queue Listener Service
//!
//! Binary entry point. Loads configuration, initializes logging, connects
//! the configured transport and runs listeners until SIGINT or SIGTERM.
//!
//! Exit codes: 1 transport failure, 2 listener start-up failure,
//! 3 configuration error, 4 signal handler failure.

use anyhow::Context;
use queue_listener_service::{
    init_logging, ListenerService, LoggingConfig, ServiceConfig, ServiceError,
};
use queue_runtime::TransportFactory;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match ServiceConfig::load() {
        Ok(config) => config,
        Err(e) => {
            // Logging settings come from the configuration; fall back to defaults
            let _ = init_logging(&LoggingConfig::default());
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(ServiceError::from(e).exit_code());
        }
    };

    init_logging(&config.logging).context("failed to initialize logging")?;
    info!(
        provider = %config.transport.provider_type(),
        queues = ?config.queues,
        "Starting Queue Listener Service"
    );

    if let Err(e) = run(config).await {
        error!(error = %e, "Queue Listener Service failed");
        std::process::exit(e.exit_code());
    }

    info!("Queue Listener Service stopped");
    Ok(())
}

async fn run(config: ServiceConfig) -> Result<(), ServiceError> {
    let transport = TransportFactory::create(config.transport.clone()).await?;
    let service = ListenerService::start(&config, transport).await?;

    let signal = shutdown_signal().await;
    match &signal {
        Ok(name) => info!(
            signal = name,
            timeout_seconds = config.shutdown_timeout_seconds,
            "Received shutdown signal, stopping listeners"
        ),
        Err(e) => error!(error = %e, "Signal handling failed, stopping listeners"),
    }

    let stragglers = service.shutdown().await;
    if !stragglers.is_empty() {
        warn!(
            queues = ?stragglers,
            "Listeners did not exit before the shutdown timeout"
        );
    }

    signal.map(|_| ())
}

/// Wait for SIGINT, or SIGTERM on Unix
async fn shutdown_signal() -> Result<&'static str, ServiceError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate()).map_err(ServiceError::Signal)?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.map_err(ServiceError::Signal)?;
                Ok("SIGINT")
            }
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(ServiceError::Signal)?;
        Ok("SIGINT")
    }
}
