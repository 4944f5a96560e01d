use std::time::Duration;

use health::HealthResult;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by a connector. Every variant names the service it came from.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("{service}: invalid configuration: {reason}")]
    InvalidConfig {
        service: &'static str,
        reason: String,
    },
    #[error("{service}: failed to connect: {source}")]
    Connect {
        service: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("{service}: probe did not complete within {timeout:?}")]
    ProbeTimeout {
        service: &'static str,
        timeout: Duration,
    },
    #[error("{service}: probe failed: {source}")]
    Probe {
        service: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("{service}: connector used before being connected")]
    NotConnected { service: &'static str },
    #[error("{service}: connector used after being closed")]
    Closed { service: &'static str },
    #[error("{service}: failed to close: {source}")]
    Close {
        service: &'static str,
        #[source]
        source: BoxError,
    },
}

impl ConnectorError {
    pub fn service(&self) -> &'static str {
        match self {
            ConnectorError::InvalidConfig { service, .. }
            | ConnectorError::Connect { service, .. }
            | ConnectorError::ProbeTimeout { service, .. }
            | ConnectorError::Probe { service, .. }
            | ConnectorError::NotConnected { service }
            | ConnectorError::Closed { service }
            | ConnectorError::Close { service, .. } => service,
        }
    }
}

/// Fatal startup failures. Each one aborts the process before any further
/// service is contacted.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("failed to connect to {service} ({target}): {source}")]
    Connect {
        service: &'static str,
        /// Masked connection string
        target: String,
        #[source]
        source: ConnectorError,
    },
    #[error("failed to validate {service}: {source}")]
    Probe {
        service: &'static str,
        #[source]
        source: ConnectorError,
    },
    #[error("{service} is not ready: {}", .result.detail)]
    Unhealthy {
        service: &'static str,
        result: HealthResult,
    },
}

impl StartupError {
    pub fn service(&self) -> &'static str {
        match self {
            StartupError::Connect { service, .. }
            | StartupError::Probe { service, .. }
            | StartupError::Unhealthy { service, .. } => service,
        }
    }
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("failed to install the log subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Everything that makes the binary exit with a non-zero status.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] envconfig::Error),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Lifecycle(#[from] lifecycle::LifecycleError),
}
