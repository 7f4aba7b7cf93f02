// src/ingest/providers/events_rss.rs
use std::time::Duration;

use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use serde_json::json;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::types::{RawBatch, SourceClient, SourceError, SourceQuery};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    category: Option<String>,
}

fn rfc2822_to_rfc3339(ts: &str) -> Option<String> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}

/// Ecosystem event calendar published as an RSS feed. Every item maps to an
/// event-kind record; the feed carries no confidence so the normalizer's
/// default applies.
pub struct EventsRssSource {
    id: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl EventsRssSource {
    pub fn from_fixture(id: impl Into<String>, xml: &str) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

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

    fn parse_items(&self, xml: &str) -> Result<Vec<serde_json::Value>, SourceError> {
        let t0 = std::time::Instant::now();
        let rss: Rss = from_str(xml).map_err(|e| {
            SourceError::invalid_response(&self.id, format!("parsing events rss xml: {e}"))
        })?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            out.push(json!({
                "type": "event",
                "title": it.title,
                "link": it.link,
                "description": it.description,
                "sector": it.category,
                "start_date": it.pub_date.as_deref().and_then(rfc2822_to_rfc3339),
            }));
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_records_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SourceClient for EventsRssSource {
    async fn fetch(&self, _query: &SourceQuery) -> Result<RawBatch, SourceError> {
        let records = match &self.mode {
            Mode::Fixture(xml) => self.parse_items(xml)?,
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| map_transport_error(&self.id, e))?;

                let status = resp.status();
                if status.as_u16() == 429 {
                    return Err(SourceError::rate_limited(&self.id, "feed rate limit exceeded"));
                }
                if !status.is_success() {
                    return Err(SourceError::unavailable(
                        &self.id,
                        format!("feed returned {status}"),
                    ));
                }

                let body = resp
                    .text()
                    .await
                    .map_err(|e| map_transport_error(&self.id, e))?;
                self.parse_items(&body)?
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
