// src/ingest/normalize.rs
//
// Pure mapping from raw provider records to typed candidates. No network,
// no persistence; the pipeline owns both sides of this boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::ingest::types::{
    CandidateEntity, EventCandidate, OpportunityCandidate, RawBatch, StartupCandidate,
};

/// Confidence assigned when a source does not score its own output.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Result of normalizing one batch: typed candidates plus the number of
/// records that could not be mapped (counted, never a hard error).
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub entities: Vec<CandidateEntity>,
    pub dropped: usize,
}

/// Loose record shape shared by all sources. Aliases absorb the usual
/// field-name drift in AI-extracted output.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "type", alias = "record_type")]
    kind: Option<String>,
    #[serde(default, alias = "title", alias = "company", alias = "company_name")]
    name: Option<String>,
    #[serde(default, alias = "summary", alias = "snippet")]
    description: Option<String>,
    #[serde(default, alias = "industry", alias = "vertical")]
    sector: Option<String>,
    #[serde(default, alias = "geography", alias = "region", alias = "city")]
    location: Option<String>,
    #[serde(default, alias = "url", alias = "link", alias = "homepage")]
    website: Option<String>,
    #[serde(default, alias = "funding_amount", alias = "prize")]
    amount: Option<String>,
    #[serde(default, alias = "application_deadline", alias = "closes_at")]
    deadline: Option<String>,
    #[serde(default, alias = "start_date", alias = "date")]
    starts_at: Option<String>,
    #[serde(default, alias = "end_date")]
    ends_at: Option<String>,
    #[serde(default, alias = "score")]
    confidence: Option<f32>,
}

/// Normalize text: decode HTML entities, strip tags, collapse whitespace,
/// normalize quotes, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize curly quotes and guillemets to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

fn clean_opt(s: Option<String>) -> Option<String> {
    s.map(|v| normalize_text(&v)).filter(|v| !v.is_empty())
}

/// Accepts RFC 3339 first, then bare `YYYY-MM-DD` (taken as midnight UTC).
/// Anything else becomes `None`; a bad date never drops the record.
fn parse_date(s: Option<&str>) -> Option<DateTime<Utc>> {
    let s = s?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| DateTime::from_naive_utc_and_offset(ndt, Utc))
}

fn clamp_confidence(c: Option<f32>) -> f32 {
    c.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0)
}

/// Map one batch into typed candidates. Records with no usable kind or
/// name are dropped silently and counted.
pub fn normalize_batch(batch: &RawBatch) -> NormalizedBatch {
    let mut out = NormalizedBatch::default();

    for value in &batch.records {
        let record: RawRecord = match serde_json::from_value(value.clone()) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(source = %batch.source_id, error = %e, "unmappable record");
                out.dropped += 1;
                continue;
            }
        };

        match map_record(record, &batch.source_id) {
            Some(entity) => out.entities.push(entity),
            None => out.dropped += 1,
        }
    }

    out
}

fn map_record(record: RawRecord, source_id: &str) -> Option<CandidateEntity> {
    let kind = record.kind.as_deref().map(str::to_ascii_lowercase)?;
    let name = clean_opt(record.name)?;

    let description = clean_opt(record.description);
    let sector = clean_opt(record.sector);
    let location = clean_opt(record.location);
    let website = record.website.map(|w| w.trim().to_string()).filter(|w| !w.is_empty());
    let source = source_id.to_string();
    let confidence = clamp_confidence(record.confidence);

    let entity = match kind.as_str() {
        "startup" | "company" => CandidateEntity::Startup(StartupCandidate {
            name,
            description,
            sector,
            location,
            website,
            source,
            confidence,
        }),
        "opportunity" | "funding" | "grant" | "accelerator" => {
            CandidateEntity::Opportunity(OpportunityCandidate {
                title: name,
                description,
                sector,
                location,
                link: website,
                amount: clean_opt(record.amount),
                deadline: parse_date(record.deadline.as_deref()),
                source,
                confidence,
            })
        }
        "event" | "conference" | "meetup" => CandidateEntity::Event(EventCandidate {
            title: name,
            description,
            sector,
            location,
            link: website,
            starts_at: parse_date(record.starts_at.as_deref()),
            ends_at: parse_date(record.ends_at.as_deref()),
            source,
            confidence,
        }),
        _ => return None,
    };

    Some(entity)
}
