// tests/ingest_config.rs
use ecosystem_radar::ingest::config::{load_settings_from, IngestSettings};
use std::fs;
use std::time::Duration;

#[test]
fn toml_file_round_trips_through_component_configs() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("ingest.toml");
    fs::write(
        &path,
        r#"
[schedule]
autostart = true
interval_secs = 900
max_retries = 3
retry_delay_secs = 5

[pipeline]
max_in_flight = 8
source_timeout_secs = 10
confidence_threshold = 0.55

[query]
sector = "fintech"
geography = "EU"
keywords = ["payments", "b2b"]

[sources]
web_search_url = "https://search.example/api"
"#,
    )
    .unwrap();

    let settings = load_settings_from(&path).unwrap();
    assert!(settings.schedule.autostart);

    let schedule = settings.schedule_config();
    assert_eq!(schedule.interval, Duration::from_secs(900));
    assert_eq!(schedule.max_retries, 3);
    assert_eq!(schedule.retry_delay, Duration::from_secs(5));

    let pipeline = settings.pipeline_config();
    assert_eq!(pipeline.max_in_flight, 8);
    assert_eq!(pipeline.source_timeout, Duration::from_secs(10));
    assert_eq!(pipeline.confidence_threshold, 0.55);

    let query = settings.source_query();
    assert_eq!(query.sector.as_deref(), Some("fintech"));
    assert_eq!(query.keywords, vec!["payments".to_string(), "b2b".into()]);

    assert_eq!(
        settings.sources.web_search_url.as_deref(),
        Some("https://search.example/api")
    );
    assert_eq!(settings.sources.events_feed_url, None);
}

#[test]
fn json_file_parses_with_partial_sections() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("ingest.json");
    fs::write(
        &path,
        r#"{"schedule": {"interval_secs": 120}, "sources": {"events_feed_url": "https://events.example/feed"}}"#,
    )
    .unwrap();

    let settings = load_settings_from(&path).unwrap();
    assert_eq!(settings.schedule.interval_secs, 120);
    // untouched sections keep their defaults
    assert_eq!(settings.pipeline, IngestSettings::default().pipeline);
    assert_eq!(
        settings.sources.events_feed_url.as_deref(),
        Some("https://events.example/feed")
    );
}

#[test]
fn unreadable_path_is_a_context_rich_error() {
    let err = load_settings_from(std::path::Path::new("/definitely/missing.toml"))
        .expect_err("missing file must fail");
    assert!(err.to_string().contains("missing.toml"));
}
