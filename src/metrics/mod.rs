//! Metrics records and the sinks that deliver them.

pub mod http;

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::tracker::CycleTimings;
use crate::metadata::CommonMetadata;

pub use http::HttpMetricsSink;

/// One delivered measurement: environment metadata plus what was timed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    #[serde(flatten)]
    pub metadata: CommonMetadata,
    #[serde(flatten)]
    pub measurement: Measurement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Measurement {
    /// A finished HMR cycle.
    Hmr(CycleTimings),
    /// A production build.
    #[serde(rename_all = "camelCase")]
    Build { build_time: u64 },
}

impl MetricsRecord {
    pub fn new(metadata: CommonMetadata, measurement: Measurement) -> Self {
        Self {
            metadata,
            measurement,
        }
    }

    pub fn hmr_timings(&self) -> Option<&CycleTimings> {
        match &self.measurement {
            Measurement::Hmr(timings) => Some(timings),
            Measurement::Build { .. } => None,
        }
    }
}

/// Destination for metrics records.
///
/// `send` never fails from the caller's point of view; implementations log
/// and drop whatever they cannot deliver.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn send(&self, record: MetricsRecord);
}

/// Keeps records in memory. Useful for tests and for embedders that want
/// to inspect what would have been sent.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<MetricsRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricsRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until at least `count` records arrived or `timeout` elapsed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<MetricsRecord> {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.len() < count && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.records()
    }
}

#[async_trait]
impl MetricsSink for MemorySink {
    async fn send(&self, record: MetricsRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}
