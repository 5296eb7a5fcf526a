//! Delivers records to a metrics collector over HTTP.

use async_trait::async_trait;

use crate::core::error::TimingError;
use crate::metrics::{MetricsRecord, MetricsSink};

/// Default collector address.
pub const DEFAULT_ENDPOINT: &str = "http://compilation-metrics/vite";

/// POSTs each record as JSON. Delivery is best effort: no retries, and
/// failures end in a log line.
#[derive(Clone, Debug)]
pub struct HttpMetricsSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMetricsSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        Self {
            client,
            endpoint: if endpoint.trim().is_empty() {
                DEFAULT_ENDPOINT.to_string()
            } else {
                endpoint
            },
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one record, reporting what went wrong.
    pub async fn try_send(&self, record: &MetricsRecord) -> Result<(), TimingError> {
        let response = self.client.post(&self.endpoint).json(record).send().await?;

        if !response.status().is_success() {
            return Err(TimingError::Status {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

impl Default for HttpMetricsSink {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[async_trait]
impl MetricsSink for HttpMetricsSink {
    async fn send(&self, record: MetricsRecord) {
        match self.try_send(&record).await {
            Ok(()) => log::debug!(
                "[vite-timing] Sent metrics {} to {}",
                record.metadata.id,
                self.endpoint
            ),
            Err(e) => log::error!("[vite-timing] Failed to send metrics: {}", e),
        }
    }
}
