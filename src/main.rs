//! Ecosystem Radar - Binary Entrypoint
//! Boots the Axum admin surface and the background ingestion scheduler.
//!
//! See `README.md` for quickstart.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ecosystem_radar::api::{self, AppState};
use ecosystem_radar::ingest::providers::{events_rss::EventsRssSource, web_search::WebSearchSource};
use ecosystem_radar::ingest::store::InMemoryStore;
use ecosystem_radar::ingest::types::SourceClient;
use ecosystem_radar::ingest::config as ingest_config;
use ecosystem_radar::metrics::Metrics;
use ecosystem_radar::{IngestionPipeline, IngestionScheduler};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - INGEST_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("INGEST_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ingest=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let settings =
        ingest_config::load_settings_default().expect("Failed to load ingest settings");

    let metrics = Metrics::init(settings.pipeline.confidence_threshold);

    // One SourceClient per configured endpoint; the order here is the
    // dedup tie-break order.
    let fetch_timeout = Duration::from_secs(settings.pipeline.source_timeout_secs);
    let mut sources: Vec<Arc<dyn SourceClient>> = Vec::new();
    if let Some(url) = &settings.sources.web_search_url {
        sources.push(Arc::new(WebSearchSource::from_url(
            "web_search",
            url.clone(),
            fetch_timeout,
        )));
    }
    if let Some(url) = &settings.sources.events_feed_url {
        sources.push(Arc::new(EventsRssSource::from_url(
            "events_feed",
            url.clone(),
            fetch_timeout,
        )));
    }
    if sources.is_empty() {
        tracing::warn!("no ingestion sources configured; runs will import nothing");
    }

    let store = Arc::new(InMemoryStore::new());
    let pipeline = IngestionPipeline::new(sources, store, settings.pipeline_config());
    let scheduler = IngestionScheduler::new(
        pipeline,
        settings.source_query(),
        settings.schedule_config(),
    );
    let _timer_loop = scheduler.spawn_loop();
    if settings.schedule.autostart {
        scheduler.start();
    }

    let router = api::router(AppState { scheduler }).merge(metrics.router());
    Ok(router.into())
}
