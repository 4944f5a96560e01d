use std::time::{Duration, Instant};

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncConnectionConfig;
use async_trait::async_trait;
use health::HealthResult;
use tracing::info;

use crate::config::ConnectionString;
use crate::connectors::Connector;
use crate::error::ConnectorError;

pub const SERVICE: &str = "redis";

const PONG: &str = "PONG";

/// Single multiplexed connection to the cache. Cloning a multiplexed connection
/// shares the underlying socket, so there is only ever one live connection.
pub struct RedisConnector {
    url: ConnectionString,
    probe_timeout: Duration,
    connection: Option<MultiplexedConnection>,
    closed: bool,
}

impl RedisConnector {
    pub fn new(url: ConnectionString, probe_timeout: Duration) -> Self {
        Self {
            url,
            probe_timeout,
            connection: None,
            closed: false,
        }
    }
}

#[async_trait]
impl Connector for RedisConnector {
    fn service(&self) -> &'static str {
        SERVICE
    }

    fn target(&self) -> &str {
        self.url.expose()
    }

    fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        if self.closed {
            return Err(ConnectorError::Closed { service: SERVICE });
        }
        if self.connection.is_some() {
            return Ok(());
        }

        let client = ::redis::Client::open(self.url.expose()).map_err(|e| {
            ConnectorError::InvalidConfig {
                service: SERVICE,
                reason: format!("failed to parse Redis URL: {e}"),
            }
        })?;

        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(self.probe_timeout)
            .set_response_timeout(self.probe_timeout);
        let connection = client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|e| ConnectorError::Connect {
                service: SERVICE,
                source: Box::new(e),
            })?;

        self.connection = Some(connection);
        Ok(())
    }

    async fn probe(&mut self, timeout: Duration) -> Result<HealthResult, ConnectorError> {
        if self.closed {
            return Err(ConnectorError::Closed { service: SERVICE });
        }
        let mut connection = self
            .connection
            .clone()
            .ok_or(ConnectorError::NotConnected { service: SERVICE })?;

        let start = Instant::now();
        let cmd = ::redis::cmd("PING");
        let ping = cmd.query_async::<String>(&mut connection);
        match tokio::time::timeout(timeout, ping).await {
            Ok(Ok(reply)) if reply == PONG => {
                Ok(HealthResult::healthy(SERVICE, reply, start.elapsed()))
            }
            Ok(Ok(reply)) => Ok(HealthResult::unhealthy(
                SERVICE,
                format!("unexpected PING reply: {reply}"),
                start.elapsed(),
            )),
            Ok(Err(e)) if e.is_timeout() => Err(ConnectorError::ProbeTimeout {
                service: SERVICE,
                timeout,
            }),
            Ok(Err(e)) => Err(ConnectorError::Probe {
                service: SERVICE,
                source: Box::new(e),
            }),
            Err(_) => Err(ConnectorError::ProbeTimeout {
                service: SERVICE,
                timeout,
            }),
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.closed = true;
        if let Some(connection) = self.connection.take() {
            // The socket is released once the last clone is dropped
            drop(connection);
            info!("Redis connection closed");
        }
        Ok(())
    }
}
