//! Outbound telemetry
//!
//! Metrics are posted as JSON to `<endpoint>/<path>`. Delivery is best
//! effort; callers log failures and move on.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::engine::Metrics;
use crate::{Error, Result};

/// Request timeout for metric posts
const POST_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait abstracting the metrics transport
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Post a payload under the given path segment
    async fn post(&self, path: &str, payload: &Metrics) -> Result<()>;
}

/// HTTP metrics sink backed by reqwest
#[derive(Clone, Debug)]
pub struct HttpMetrics {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetrics {
    /// Create a sink posting under the given base URL
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(POST_TIMEOUT)
            .build()
            .map_err(|e| Error::metrics(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Create a sink with a custom HTTP client
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Full URL for a path segment
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl MetricsSink for HttpMetrics {
    async fn post(&self, path: &str, payload: &Metrics) -> Result<()> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::metrics(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::metrics(format!("{} returned HTTP {}", url, response.status())));
        }

        debug!(%url, keys = payload.len(), "posted metrics");
        Ok(())
    }
}
