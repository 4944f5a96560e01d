use std::time::{Duration, Instant};

use async_trait::async_trait;
use health::HealthResult;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::config::{ConnectionString, Secret};
use crate::connectors::Connector;
use crate::error::ConnectorError;

pub const SERVICE: &str = "meilisearch";

/// The only status accepted from the health endpoint.
pub const AVAILABLE: &str = "available";

const HEALTH_PATH: &str = "health";

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// HTTP client to the search service.
///
/// There is no persistent transport to hold on to: `connect` only builds the
/// client, and `close` drops it.
pub struct MeilisearchConnector {
    url: ConnectionString,
    api_key: Secret,
    probe_timeout: Duration,
    client: Option<SearchClient>,
    closed: bool,
}

struct SearchClient {
    http: reqwest::Client,
    health_url: Url,
}

impl MeilisearchConnector {
    pub fn new(url: ConnectionString, api_key: Secret, probe_timeout: Duration) -> Self {
        Self {
            url,
            api_key,
            probe_timeout,
            client: None,
            closed: false,
        }
    }

    fn build_client(&self) -> Result<SearchClient, ConnectorError> {
        let invalid = |reason: String| ConnectorError::InvalidConfig {
            service: SERVICE,
            reason,
        };

        let mut base = Url::parse(self.url.expose())
            .map_err(|e| invalid(format!("failed to parse Meilisearch URL: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!(
                "unsupported Meilisearch URL scheme: {}",
                base.scheme()
            )));
        }
        // Keep any path prefix when joining the endpoint
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let health_url = base
            .join(HEALTH_PATH)
            .map_err(|e| invalid(format!("failed to build health URL: {e}")))?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key.expose()))
            .map_err(|_| invalid("API key is not a valid header value".to_owned()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConnectorError::Connect {
                service: SERVICE,
                source: Box::new(e),
            })?;

        Ok(SearchClient { http, health_url })
    }
}

#[async_trait]
impl Connector for MeilisearchConnector {
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
        if self.client.is_none() {
            self.client = Some(self.build_client()?);
        }
        Ok(())
    }

    async fn probe(&mut self, timeout: Duration) -> Result<HealthResult, ConnectorError> {
        if self.closed {
            return Err(ConnectorError::Closed { service: SERVICE });
        }
        let client = self
            .client
            .as_ref()
            .ok_or(ConnectorError::NotConnected { service: SERVICE })?;

        let probe_error = |e: reqwest::Error| {
            if e.is_timeout() {
                ConnectorError::ProbeTimeout {
                    service: SERVICE,
                    timeout,
                }
            } else {
                ConnectorError::Probe {
                    service: SERVICE,
                    source: Box::new(e),
                }
            }
        };

        let start = Instant::now();
        let check = async {
            let response = client
                .http
                .get(client.health_url.clone())
                .send()
                .await?
                .error_for_status()?;
            response.json::<HealthResponse>().await
        };

        let health = match tokio::time::timeout(timeout, check).await {
            Ok(result) => result.map_err(probe_error)?,
            Err(_) => {
                return Err(ConnectorError::ProbeTimeout {
                    service: SERVICE,
                    timeout,
                })
            }
        };

        if health.status == AVAILABLE {
            Ok(HealthResult::healthy(SERVICE, health.status, start.elapsed()))
        } else {
            Ok(HealthResult::unhealthy(
                SERVICE,
                format!("Meilisearch is not available, status: {}", health.status),
                start.elapsed(),
            ))
        }
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.closed = true;
        // Nothing to release beyond the client itself
        self.client = None;
        info!("Meilisearch connection closed");
        Ok(())
    }
}
