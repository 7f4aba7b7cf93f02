use serde_json::json;
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ingest::scheduler::{IngestionScheduler, ScheduleStatus};

/// Admin surface over the one process-wide scheduler. The UI layer that
/// consumes this lives elsewhere; these routes are its whole contract.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: IngestionScheduler,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/ingestion/status", get(status))
        .route("/api/ingestion/start", post(start))
        .route("/api/ingestion/stop", post(stop))
        .route("/api/ingestion/trigger", post(trigger))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<ScheduleStatus> {
    Json(state.scheduler.status())
}

async fn start(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.scheduler.start();
    Json(json!({ "enabled": true }))
}

async fn stop(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.scheduler.stop();
    Json(json!({ "enabled": false }))
}

/// Blocks for up to the full retry budget (see `ScheduleConfig`); a 409
/// means some run (scheduled or manual) already holds the slot.
async fn trigger(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.scheduler.trigger().await {
        Ok(imported) => (StatusCode::OK, Json(json!({ "imported": imported }))),
        Err(e) => (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() }))),
    }
}
