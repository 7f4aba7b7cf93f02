// src/ingest/types.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discovery query fanned out to every configured source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceQuery {
    pub sector: Option<String>,
    pub geography: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Unprocessed payload returned by one source for one query.
///
/// Records stay as loose JSON until the normalizer maps them; sources
/// disagree too much on field names for anything stronger at this boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBatch {
    pub source_id: String,
    pub fetched_at: u64, // unix seconds
    pub records: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Startup,
    Opportunity,
    Event,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Startup => write!(f, "startup"),
            EntityKind::Opportunity => write!(f, "opportunity"),
            EntityKind::Event => write!(f, "event"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartupCandidate {
    pub name: String,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub source: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpportunityCandidate {
    pub title: String,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub amount: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub source: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventCandidate {
    pub title: String,
    pub description: Option<String>,
    pub sector: Option<String>,
    pub location: Option<String>,
    pub link: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub source: String,
    pub confidence: f32,
}

/// Normalized, typed record extracted from a `RawBatch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CandidateEntity {
    Startup(StartupCandidate),
    Opportunity(OpportunityCandidate),
    Event(EventCandidate),
}

impl CandidateEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            CandidateEntity::Startup(_) => EntityKind::Startup,
            CandidateEntity::Opportunity(_) => EntityKind::Opportunity,
            CandidateEntity::Event(_) => EntityKind::Event,
        }
    }

    /// Name for startups, title for opportunities and events.
    pub fn display_name(&self) -> &str {
        match self {
            CandidateEntity::Startup(s) => &s.name,
            CandidateEntity::Opportunity(o) => &o.title,
            CandidateEntity::Event(e) => &e.title,
        }
    }

    pub fn sector(&self) -> Option<&str> {
        match self {
            CandidateEntity::Startup(s) => s.sector.as_deref(),
            CandidateEntity::Opportunity(o) => o.sector.as_deref(),
            CandidateEntity::Event(e) => e.sector.as_deref(),
        }
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            CandidateEntity::Startup(s) => s.website.as_deref(),
            CandidateEntity::Opportunity(o) => o.link.as_deref(),
            CandidateEntity::Event(e) => e.link.as_deref(),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            CandidateEntity::Startup(s) => &s.source,
            CandidateEntity::Opportunity(o) => &o.source,
            CandidateEntity::Event(e) => &e.source,
        }
    }

    pub fn confidence(&self) -> f32 {
        match self {
            CandidateEntity::Startup(s) => s.confidence,
            CandidateEntity::Opportunity(o) => o.confidence,
            CandidateEntity::Event(e) => e.confidence,
        }
    }
}

/// Per-run summary surfaced to the admin API and the status surface.
///
/// Counts reflect entities that survived threshold filtering, dedup and
/// persistence; raw candidate counts show up only in metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub startups: usize,
    pub opportunities: usize,
    pub events: usize,
    pub errors: Vec<String>,
}

impl ImportResult {
    pub fn total(&self) -> usize {
        self.startups + self.opportunities + self.events
    }

    /// Zero entities and at least one error. The only pipeline outcome the
    /// scheduler treats as retryable.
    pub fn is_zero_yield(&self) -> bool {
        self.total() == 0 && !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    Timeout,
    RateLimited,
    InvalidResponse,
    Unavailable,
}

impl SourceErrorKind {
    /// InvalidResponse is the one permanent kind; retrying the same request
    /// against a broken payload shape buys nothing.
    pub fn is_transient(&self) -> bool {
        !matches!(self, SourceErrorKind::InvalidResponse)
    }
}

/// Normalized failure from one source. Providers map every transport or
/// payload error into this before it crosses the pipeline boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source_id: String,
    pub kind: SourceErrorKind,
    pub message: String,
}

impl SourceError {
    pub fn new(
        source_id: impl Into<String>,
        kind: SourceErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_id, SourceErrorKind::Timeout, message)
    }

    pub fn rate_limited(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_id, SourceErrorKind::RateLimited, message)
    }

    pub fn invalid_response(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_id, SourceErrorKind::InvalidResponse, message)
    }

    pub fn unavailable(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(source_id, SourceErrorKind::Unavailable, message)
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}: {}", self.source_id, self.kind, self.message)
    }
}

impl std::error::Error for SourceError {}

/// Capability boundary to one external data source.
///
/// Implementations return raw candidate records or a typed failure. The
/// wall-clock bound on a fetch is enforced by the pipeline, so fixture-backed
/// sources in tests get the same treatment as HTTP ones.
#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    async fn fetch(&self, query: &SourceQuery) -> Result<RawBatch, SourceError>;
    fn id(&self) -> &str;
}
