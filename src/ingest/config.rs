// src/ingest/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::ingest::pipeline::PipelineConfig;
use crate::ingest::scheduler::ScheduleConfig;
use crate::ingest::types::SourceQuery;

const ENV_PATH: &str = "INGEST_CONFIG_PATH";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Enable the schedule at boot instead of waiting for an admin start.
    pub autostart: bool,
    pub interval_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            autostart: false,
            interval_secs: 3600,
            max_retries: 2,
            retry_delay_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_in_flight: usize,
    pub source_timeout_secs: u64,
    pub confidence_threshold: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            source_timeout_secs: 20,
            confidence_threshold: 0.4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuerySettings {
    pub sector: Option<String>,
    pub geography: Option<String>,
    pub keywords: Vec<String>,
}

/// Endpoints for the configured sources. A missing URL disables that source.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceSettings {
    pub web_search_url: Option<String>,
    pub events_feed_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSettings {
    pub schedule: ScheduleSettings,
    pub pipeline: PipelineSettings,
    pub query: QuerySettings,
    pub sources: SourceSettings,
}

impl IngestSettings {
    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            interval: Duration::from_secs(self.schedule.interval_secs),
            max_retries: self.schedule.max_retries,
            retry_delay: Duration::from_secs(self.schedule.retry_delay_secs),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            max_in_flight: self.pipeline.max_in_flight,
            source_timeout: Duration::from_secs(self.pipeline.source_timeout_secs),
            confidence_threshold: self.pipeline.confidence_threshold,
        }
    }

    pub fn source_query(&self) -> SourceQuery {
        SourceQuery {
            sector: self.query.sector.clone(),
            geography: self.query.geography.clone(),
            keywords: self.query.keywords.clone(),
        }
    }
}

/// Load settings from an explicit path. Supports TOML or JSON formats.
pub fn load_settings_from(path: &Path) -> Result<IngestSettings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading ingest settings from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let settings = parse_settings(&content, ext.as_str())?;
    tracing::info!(
        path = %path.display(),
        fingerprint = %fingerprint(&content),
        "ingest settings loaded"
    );
    Ok(settings)
}

/// Load settings using env var + fallbacks:
/// 1) $INGEST_CONFIG_PATH
/// 2) config/ingest.toml
/// 3) config/ingest.json
/// 4) built-in defaults
pub fn load_settings_default() -> Result<IngestSettings> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_settings_from(&pb);
        } else {
            return Err(anyhow!("INGEST_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/ingest.toml");
    if toml_p.exists() {
        return load_settings_from(&toml_p);
    }
    let json_p = PathBuf::from("config/ingest.json");
    if json_p.exists() {
        return load_settings_from(&json_p);
    }
    Ok(IngestSettings::default())
}

fn parse_settings(s: &str, hint_ext: &str) -> Result<IngestSettings> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains('[');
    if try_toml {
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = serde_json::from_str(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = toml::from_str(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported ingest settings format"))
}

/// Short content hash for the startup log, so deployed config drift is
/// visible without printing the config itself.
fn fingerprint(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn toml_and_json_both_parse() {
        let toml_src = r#"
[schedule]
interval_secs = 600
max_retries = 1

[pipeline]
confidence_threshold = 0.6

[query]
sector = "climate"
keywords = ["seed", "pre-seed"]
"#;
        let s = parse_settings(toml_src, "toml").unwrap();
        assert_eq!(s.schedule.interval_secs, 600);
        assert_eq!(s.schedule.max_retries, 1);
        assert_eq!(s.schedule.retry_delay_secs, 30); // untouched default
        assert_eq!(s.pipeline.confidence_threshold, 0.6);
        assert_eq!(s.query.sector.as_deref(), Some("climate"));

        let json_src = r#"{"pipeline": {"max_in_flight": 2}}"#;
        let s = parse_settings(json_src, "json").unwrap();
        assert_eq!(s.pipeline.max_in_flight, 2);
        assert_eq!(s.schedule.interval_secs, 3600);
    }

    #[test]
    fn settings_convert_to_component_configs() {
        let s = IngestSettings::default();
        assert_eq!(s.schedule_config().interval, Duration::from_secs(3600));
        assert_eq!(s.pipeline_config().source_timeout, Duration::from_secs(20));
        assert_eq!(s.source_query(), SourceQuery::default());
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD in a temp dir so a real config/ in the repo cannot leak in.
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);

        // No files in temp CWD -> defaults
        let v = load_settings_default().unwrap();
        assert_eq!(v, IngestSettings::default());

        // Env takes precedence
        let p_json = tmp.path().join("ingest.json");
        fs::write(&p_json, r#"{"schedule": {"interval_secs": 120}}"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let v2 = load_settings_default().unwrap();
        assert_eq!(v2.schedule.interval_secs, 120);
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
