//! Logging and metrics initialization for the binary.

use std::io::{self, IsTerminal};
use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
    #[error("failed to install prometheus exporter: {0}")]
    Metrics(String),
}

/// Installs the global subscriber. The filter comes from `RUST_LOG`, falling
/// back to `default_filter`.
///
/// # Errors
///
/// Fails when the filter does not parse or a subscriber is already installed.
pub fn init_tracing(format: LogFormat, default_filter: &str) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| TelemetryError::Filter(e.to_string()))?,
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Pretty => Box::new(builder.finish()),
    };
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Serves Prometheus metrics on `addr`. Must run inside a tokio runtime.
///
/// # Errors
///
/// Fails when the recorder or the listener cannot be installed.
pub fn init_metrics(addr: SocketAddr) -> Result<(), TelemetryError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))
}

