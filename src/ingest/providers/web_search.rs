// src/ingest/providers/web_search.rs
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Deserialize;
use serde_json::Value;

use crate::ingest::types::{RawBatch, SourceClient, SourceError, SourceQuery};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// Source backed by an AI web-search/extraction endpoint: POSTs the query,
/// expects `{"results": [...]}` with loosely-shaped records the normalizer
/// maps later.
pub struct WebSearchSource {
    id: String,
    mode: Mode,
}

enum Mode {
    // Owned copy so tests can hand in any &str.
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl WebSearchSource {
    pub fn from_fixture(id: impl Into<String>, json: &str) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Fixture(json.to_string()),
        }
    }

    /// The reqwest timeout here backstops the pipeline's own per-fetch bound
    /// so a dead connection cannot hold a pool slot past it.
    pub fn from_url(id: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client");
        Self {
            id: id.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    fn parse_records(&self, body: &str) -> Result<Vec<Value>, SourceError> {
        let t0 = std::time::Instant::now();
        let resp: SearchResponse = serde_json::from_str(body).map_err(|e| {
            SourceError::invalid_response(&self.id, format!("bad search payload: {e}"))
        })?;

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_records_total").increment(resp.results.len() as u64);
        Ok(resp.results)
    }
}

#[async_trait::async_trait]
impl SourceClient for WebSearchSource {
    async fn fetch(&self, query: &SourceQuery) -> Result<RawBatch, SourceError> {
        let records = match &self.mode {
            Mode::Fixture(body) => self.parse_records(body)?,
            Mode::Http { url, client } => {
                let resp = client
                    .post(url)
                    .json(query)
                    .send()
                    .await
                    .map_err(|e| map_transport_error(&self.id, e))?;

                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(SourceError::rate_limited(
                        &self.id,
                        "search API rate limit exceeded",
                    ));
                }
                if !status.is_success() {
                    return Err(SourceError::unavailable(
                        &self.id,
                        format!("search API returned {status}"),
                    ));
                }

                let body = resp
                    .text()
                    .await
                    .map_err(|e| map_transport_error(&self.id, e))?;
                self.parse_records(&body)?
            }
        };

        Ok(RawBatch {
            source_id: self.id.clone(),
            fetched_at: chrono::Utc::now().timestamp().max(0) as u64,
            records,
        })
    }

    fn id(&self) -> &str {
        &self.id
    }
}

fn map_transport_error(id: &str, e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::timeout(id, e.to_string())
    } else {
        SourceError::unavailable(id, e.to_string())
    }
}
