// tests/api_http.rs
//
// HTTP-level tests for the admin Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET  /health
// - GET  /api/ingestion/status
// - POST /api/ingestion/start / stop (idempotency)
// - POST /api/ingestion/trigger (result payload + 409 while running)

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use ecosystem_radar::api::{self, AppState};
use ecosystem_radar::ingest::pipeline::{IngestionPipeline, PipelineConfig};
use ecosystem_radar::ingest::scheduler::{IngestionScheduler, ScheduleConfig};
use ecosystem_radar::ingest::store::InMemoryStore;
use ecosystem_radar::ingest::types::{RawBatch, SourceClient, SourceError, SourceQuery};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

struct StaticSource {
    delay: Duration,
}

#[async_trait]
impl SourceClient for StaticSource {
    async fn fetch(&self, _query: &SourceQuery) -> Result<RawBatch, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(RawBatch {
            source_id: "static".into(),
            fetched_at: 1_000,
            records: vec![serde_json::json!({
                "type": "startup", "name": "Acme", "confidence": 0.8
            })],
        })
    }
    fn id(&self) -> &str {
        "static"
    }
}

fn test_scheduler(delay: Duration) -> IngestionScheduler {
    let pipeline = IngestionPipeline::new(
        vec![Arc::new(StaticSource { delay })],
        Arc::new(InMemoryStore::new()),
        PipelineConfig {
            max_in_flight: 2,
            source_timeout: Duration::from_secs(5),
            confidence_threshold: 0.4,
        },
    );
    IngestionScheduler::new(
        pipeline,
        SourceQuery::default(),
        ScheduleConfig {
            interval: Duration::from_secs(3600),
            max_retries: 0,
            retry_delay: Duration::from_millis(10),
        },
    )
}

/// Build the same Router the binary uses.
fn test_router(scheduler: IngestionScheduler) -> Router {
    api::router(AppState { scheduler })
}

async fn json_body(resp: shuttle_axum::axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json body")
}

fn req(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router(test_scheduler(Duration::ZERO));

    let resp = app.oneshot(req("GET", "/health")).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "ok");
}

#[tokio::test]
async fn api_status_exposes_the_schedule_contract() {
    let scheduler = test_scheduler(Duration::ZERO);
    let app = test_router(scheduler.clone());

    let resp = app
        .oneshot(req("GET", "/api/ingestion/status"))
        .await
        .expect("oneshot status");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    // Contract checks for UI consumers
    assert_eq!(v["enabled"], false);
    assert_eq!(v["running"], false);
    assert!(v.get("last_run_at").is_some(), "missing 'last_run_at'");
    assert!(v.get("next_run_at").is_some(), "missing 'next_run_at'");
    assert_eq!(v["interval_ms"], 3_600_000);
    assert!(v["config"].get("max_retries").is_some(), "missing config");
}

#[tokio::test]
async fn api_start_and_stop_are_idempotent() {
    let scheduler = test_scheduler(Duration::ZERO);

    for _ in 0..2 {
        let resp = test_router(scheduler.clone())
            .oneshot(req("POST", "/api/ingestion/start"))
            .await
            .expect("oneshot start");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["enabled"], true);
    }
    assert!(scheduler.status().enabled);
    assert!(scheduler.status().next_run_at.is_some());

    for _ in 0..2 {
        let resp = test_router(scheduler.clone())
            .oneshot(req("POST", "/api/ingestion/stop"))
            .await
            .expect("oneshot stop");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["enabled"], false);
    }
    assert!(!scheduler.status().enabled);
    assert_eq!(scheduler.status().next_run_at, None);
}

#[tokio::test]
async fn api_trigger_returns_the_import_result() {
    let app = test_router(test_scheduler(Duration::ZERO));

    let resp = app
        .oneshot(req("POST", "/api/ingestion/trigger"))
        .await
        .expect("oneshot trigger");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = json_body(resp).await;
    assert_eq!(v["imported"]["startups"], 1);
    assert_eq!(v["imported"]["opportunities"], 0);
    assert_eq!(v["imported"]["events"], 0);
    assert_eq!(v["imported"]["errors"], serde_json::json!([]));
}

#[tokio::test]
async fn api_trigger_conflicts_while_a_run_is_in_flight() {
    let scheduler = test_scheduler(Duration::from_millis(300));

    let background = scheduler.clone();
    let first = tokio::spawn(async move { background.trigger().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resp = test_router(scheduler)
        .oneshot(req("POST", "/api/ingestion/trigger"))
        .await
        .expect("oneshot trigger");
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let v = json_body(resp).await;
    assert_eq!(v["error"], "ingestion already running");

    assert!(first.await.expect("join").is_ok());
}
