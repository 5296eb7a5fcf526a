//! Metrics delivery against a mocked collector.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use vite_timing::{
    CycleTimings, HttpMetricsSink, Measurement, MetadataProvider, MetricsRecord, MetricsSink,
    PhaseBreakdown, TimingError, VcsProbe,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NoVcs;

#[async_trait]
impl VcsProbe for NoVcs {
    async fn query(&self, _args: &[&str]) -> Option<String> {
        None
    }
}

async fn record() -> MetricsRecord {
    let metadata = MetadataProvider::with_probe(Arc::new(NoVcs))
        .common_metadata(200.0, Some("dev"))
        .await;
    MetricsRecord::new(
        metadata,
        Measurement::Hmr(CycleTimings {
            file: "src/test.ts".to_string(),
            total_time: 200.0,
            server_processing_time: 100,
            module_count: 2,
            phases: PhaseBreakdown::default(),
        }),
    )
}

#[tokio::test]
async fn test_posts_json_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/vite"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sink = HttpMetricsSink::new(format!("{}/vite", server.uri()));
    sink.send(record().await).await;

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["kind"], "hmr");
    assert_eq!(body["file"], "src/test.ts");
    assert_eq!(body["serverProcessingTime"], 100);
    assert_eq!(body["identifier"], "dev");
}

#[tokio::test]
async fn test_error_status_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let sink = HttpMetricsSink::new(server.uri());
    let record = record().await;

    let err = sink.try_send(&record).await.unwrap_err();
    assert!(matches!(err, TimingError::Status { status: 503 }));

    // The trait method swallows it.
    sink.send(record).await;
}

#[tokio::test]
async fn test_unreachable_endpoint_is_swallowed() {
    let sink = HttpMetricsSink::new("http://127.0.0.1:9/unreachable");
    let record = record().await;

    assert!(matches!(
        sink.try_send(&record).await,
        Err(TimingError::Http(_))
    ));
    sink.send(record).await;
}
