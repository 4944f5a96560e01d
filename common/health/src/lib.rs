use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

/// Health reporting for the backing services of the process.
///
/// Each connector produces a [`HealthResult`] when probed. Results are transient:
/// they are consumed right away by the caller and folded into a [`HealthStatus`]
/// for the readiness log line, never persisted.
///
/// The process' health status is the combination of the individual results:
///   - if any component is unhealthy, the process is unhealthy
///   - if no component reported yet, the process is unhealthy
///   - otherwise, the process is healthy

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResult {
    /// Name of the probed service, as used in log lines and errors
    pub service: String,
    pub healthy: bool,
    /// Free-form detail for display, e.g. the status reported by the service
    pub detail: String,
    /// Time spent in the probe round-trip
    pub elapsed: Duration,
}

impl HealthResult {
    pub fn healthy(service: &str, detail: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            service: service.to_owned(),
            healthy: true,
            detail: detail.into(),
            elapsed,
        }
    }

    pub fn unhealthy(service: &str, detail: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            service: service.to_owned(),
            healthy: false,
            detail: detail.into(),
            elapsed,
        }
    }
}

impl fmt::Display for HealthResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.healthy { "healthy" } else { "unhealthy" };
        write!(f, "{} is {}: {}", self.service, state, self.detail)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// Probe succeeded, with the detail reported by the service
    Healthy(String),
    /// Probe completed but the service reported a bad state
    Unhealthy(String),
}

#[derive(Default, Debug)]
pub struct HealthStatus {
    /// The overall status: true if all components are healthy
    pub healthy: bool,
    /// Current status of each component, for display
    pub components: BTreeMap<String, ComponentStatus>,
}

impl HealthStatus {
    /// Folds probe results into a process status. Later results for the same
    /// service replace earlier ones.
    pub fn from_results<'a, I>(name: &str, results: I) -> Self
    where
        I: IntoIterator<Item = &'a HealthResult>,
    {
        let mut components = BTreeMap::new();
        for result in results {
            let status = if result.healthy {
                ComponentStatus::Healthy(result.detail.clone())
            } else {
                ComponentStatus::Unhealthy(result.detail.clone())
            };
            components.insert(result.service.clone(), status);
        }

        let healthy = !components.is_empty() // unhealthy if nothing reported yet
            && components
                .values()
                .all(|status| matches!(status, ComponentStatus::Healthy(_)));

        match healthy {
            true => info!("{} health check ok", name),
            false => warn!("{} health check failed: {:?}", name, components),
        }

        Self {
            healthy,
            components,
        }
    }
}
