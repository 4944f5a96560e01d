//! Ordered startup and deadline-bounded shutdown of the backing services.

use std::future::Future;
use std::time::Duration;

use health::{HealthResult, HealthStatus};
use lifecycle::{metrics, ShutdownDeadline, ShutdownOutcome};
use tracing::{error, info, warn};

use crate::connectors::{Connector, ConnectorState};
use crate::error::{ConnectorError, StartupError};
use crate::mask::mask_connection_string;

const SERVICE_NAME: &str = "ironarchive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Starting,
    Connecting(&'static str),
    Validating(&'static str),
    Ready,
    ShuttingDown,
    Stopped,
}

struct ManagedConnector {
    connector: Box<dyn Connector>,
    state: ConnectorState,
}

/// Owns the connectors and walks them through their lifecycle.
///
/// Startup is strictly sequential, in the order the connectors were given, and
/// stops at the first failure. Shutdown closes whatever was connected, in
/// reverse order, and only logs close failures.
pub struct Orchestrator {
    connectors: Vec<ManagedConnector>,
    shutdown_timeout: Duration,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(connectors: Vec<Box<dyn Connector>>, shutdown_timeout: Duration) -> Self {
        let connectors = connectors
            .into_iter()
            .map(|connector| ManagedConnector {
                connector,
                state: ConnectorState::Uninitialized,
            })
            .collect();

        Self {
            connectors,
            shutdown_timeout,
            phase: Phase::Starting,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// State of every connector, in acquisition order.
    pub fn states(&self) -> Vec<(&'static str, ConnectorState)> {
        self.connectors
            .iter()
            .map(|managed| (managed.connector.service(), managed.state))
            .collect()
    }

    /// Connects then probes each service in turn. The first failure is returned
    /// and no later service is contacted.
    pub async fn start(&mut self) -> Result<HealthStatus, StartupError> {
        let mut results = Vec::with_capacity(self.connectors.len());

        for managed in self.connectors.iter_mut() {
            let service = managed.connector.service();
            let target = mask_connection_string(managed.connector.target());

            self.phase = Phase::Connecting(service);
            info!(service, url = %target, "Connecting to {service}...");
            if let Err(source) = managed.connect().await {
                error!(service, url = %target, error = %source, "Failed to create {service} connection");
                metrics::emit_startup_completed(SERVICE_NAME, "connect_failed");
                return Err(StartupError::Connect {
                    service,
                    target,
                    source,
                });
            }

            self.phase = Phase::Validating(service);
            let timeout = managed.connector.probe_timeout();
            let result = match managed.probe(timeout).await {
                Ok(result) => result,
                Err(source) => {
                    error!(service, url = %target, error = %source, "Failed to ping {service}");
                    metrics::emit_startup_completed(SERVICE_NAME, "probe_failed");
                    return Err(StartupError::Probe { service, source });
                }
            };
            metrics::emit_probe_duration(service, result.healthy, result.elapsed.as_secs_f64());

            if !result.healthy {
                error!(service, url = %target, detail = %result.detail, "{service} is not ready");
                metrics::emit_startup_completed(SERVICE_NAME, "unhealthy");
                return Err(StartupError::Unhealthy { service, result });
            }

            info!(service, elapsed = ?result.elapsed, "{service} connection successful");
            results.push(result);
        }

        self.phase = Phase::Ready;
        metrics::emit_startup_completed(SERVICE_NAME, "ready");
        info!("All service connections validated successfully");
        Ok(HealthStatus::from_results("readiness", &results))
    }

    /// Closes every connector that was connected, in reverse order. The deadline
    /// starts now and is only checked once cleanup is over: it decides what gets
    /// logged, it never interrupts a close.
    pub async fn shutdown(&mut self) -> ShutdownOutcome {
        self.phase = Phase::ShuttingDown;
        let deadline = ShutdownDeadline::start(self.shutdown_timeout);
        info!(timeout = ?self.shutdown_timeout, "Shutting down server...");

        for managed in self.connectors.iter_mut().rev() {
            let service = managed.connector.service();
            match managed.close().await {
                Ok(true) => metrics::emit_component_close_result(SERVICE_NAME, service, "closed"),
                Ok(false) => {}
                Err(e) => {
                    warn!(service, error = %e, "Failed to close {service} connection");
                    metrics::emit_component_close_result(SERVICE_NAME, service, "failed");
                }
            }
        }

        let outcome = deadline.outcome();
        match outcome {
            ShutdownOutcome::Clean => {
                info!(elapsed = ?deadline.elapsed(), "Server stopped gracefully")
            }
            ShutdownOutcome::TimedOut { overrun } => warn!(
                timeout = ?self.shutdown_timeout,
                overrun = ?overrun,
                "Shutdown timeout exceeded"
            ),
        }
        metrics::emit_shutdown_completed(SERVICE_NAME, outcome.is_clean());

        self.phase = Phase::Stopped;
        outcome
    }

    /// Full lifecycle: start, announce readiness, wait for `shutdown_signal`,
    /// then shut down. Startup failures are returned before the signal is awaited.
    pub async fn run<F>(
        mut self,
        announce: &str,
        shutdown_signal: F,
    ) -> Result<ShutdownOutcome, StartupError>
    where
        F: Future<Output = String>,
    {
        let status = self.start().await?;
        info!(components = ?status.components, "Server is ready on {announce}");

        let reason = shutdown_signal.await;
        metrics::emit_shutdown_initiated(SERVICE_NAME, &reason);
        info!(trigger_reason = %reason, "shutdown initiated");

        Ok(self.shutdown().await)
    }
}

impl ManagedConnector {
    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let service = self.connector.service();
        match self.state {
            ConnectorState::Uninitialized => {}
            ConnectorState::Closed => return Err(ConnectorError::Closed { service }),
            ConnectorState::Connected | ConnectorState::Validated => return Ok(()),
        }
        self.connector.connect().await?;
        self.state = ConnectorState::Connected;
        Ok(())
    }

    async fn probe(&mut self, timeout: Duration) -> Result<HealthResult, ConnectorError> {
        let service = self.connector.service();
        match self.state {
            ConnectorState::Uninitialized => return Err(ConnectorError::NotConnected { service }),
            ConnectorState::Closed => return Err(ConnectorError::Closed { service }),
            ConnectorState::Connected | ConnectorState::Validated => {}
        }
        // Enforced here as well, for a connector that ignores its deadline
        let result = match tokio::time::timeout(timeout, self.connector.probe(timeout)).await {
            Ok(result) => result?,
            Err(_) => return Err(ConnectorError::ProbeTimeout { service, timeout }),
        };
        if result.healthy {
            self.state = ConnectorState::Validated;
        }
        Ok(result)
    }

    /// Returns whether there was anything to close.
    async fn close(&mut self) -> Result<bool, ConnectorError> {
        match self.state {
            ConnectorState::Uninitialized | ConnectorState::Closed => Ok(false),
            ConnectorState::Connected | ConnectorState::Validated => {
                self.state = ConnectorState::Closed;
                self.connector.close().await.map(|_| true)
            }
        }
    }
}
