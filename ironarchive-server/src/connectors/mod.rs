//! Connectors own the handle to one backing service each, along with the
//! service-specific health probe.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use health::HealthResult;

use crate::config::Config;
use crate::error::ConnectorError;

pub mod meilisearch;
pub mod postgres;
pub mod redis;

pub use self::meilisearch::MeilisearchConnector;
pub use self::postgres::PostgresConnector;
pub use self::redis::RedisConnector;

/// connect / probe / close over one backing service.
///
/// Implementations are built from configuration without touching the network,
/// and only acquire their underlying handle in [`Connector::connect`].
#[async_trait]
pub trait Connector: Send {
    /// Service name used in log lines, errors and metrics.
    fn service(&self) -> &'static str;

    /// Connection string, masked before it is logged.
    fn target(&self) -> &str;

    /// Deadline given to [`Connector::probe`] during startup.
    fn probe_timeout(&self) -> Duration;

    /// Acquires the underlying connection or pool.
    async fn connect(&mut self) -> Result<(), ConnectorError>;

    /// Bounded round-trip to the service. A service answering with a bad state
    /// yields an unhealthy result rather than an error.
    async fn probe(&mut self, timeout: Duration) -> Result<HealthResult, ConnectorError>;

    /// Releases the underlying handle. Must be idempotent.
    async fn close(&mut self) -> Result<(), ConnectorError>;
}

/// Lifecycle of a connector, as tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Uninitialized,
    Connected,
    Validated,
    Closed,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ConnectorState::Uninitialized => "uninitialized",
            ConnectorState::Connected => "connected",
            ConnectorState::Validated => "validated",
            ConnectorState::Closed => "closed",
        };
        f.write_str(state)
    }
}

/// The backing services in acquisition order: database, cache, then search.
pub fn from_config(config: &Config) -> Vec<Box<dyn Connector>> {
    let postgres: Box<dyn Connector> = Box::new(PostgresConnector::new(
        config.database_url.clone(),
        config.pool.settings(),
        config.probe_timeout(),
    ));
    let redis: Box<dyn Connector> = Box::new(RedisConnector::new(
        config.redis_url.clone(),
        config.probe_timeout(),
    ));
    let meilisearch: Box<dyn Connector> = Box::new(MeilisearchConnector::new(
        config.meilisearch_url.clone(),
        config.meili_master_key.clone(),
        config.meilisearch_timeout(),
    ));

    vec![postgres, redis, meilisearch]
}
