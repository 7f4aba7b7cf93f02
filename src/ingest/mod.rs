// src/ingest/mod.rs
pub mod config;
pub mod merge;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod scheduler;
pub mod store;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

pub use merge::{merge, MergeOutcome};
pub use normalize::{normalize_batch, normalize_text, NormalizedBatch};
pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use scheduler::{
    AlreadyRunningError, IngestionScheduler, ScheduleConfig, ScheduleState, ScheduleStatus,
};
pub use types::{CandidateEntity, EntityKind, ImportResult, RawBatch, SourceClient, SourceError,
    SourceErrorKind, SourceQuery};

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "ingest_candidates_total",
            "Candidates normalized from source batches."
        );
        describe_counter!(
            "ingest_kept_total",
            "Entities imported after threshold, dedup and persistence."
        );
        describe_counter!(
            "ingest_unmappable_total",
            "Raw records dropped during normalization."
        );
        describe_counter!(
            "ingest_duplicates_total",
            "Candidates removed by cross-source deduplication."
        );
        describe_counter!(
            "ingest_below_threshold_total",
            "Candidates dropped for low confidence."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetch/timeout/parse errors."
        );
        describe_counter!("ingest_runs_total", "Pipeline attempts, retries included.");
        describe_counter!("ingest_retries_total", "Zero-yield retries.");
        describe_counter!("ingest_failed_runs_total", "Attempt sequences that ended zero-yield.");
        describe_counter!("ingest_manual_triggers_total", "Admin-triggered runs.");
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_histogram!(
            "ingest_run_duration_ms",
            "Wall-clock of one pipeline pass in milliseconds."
        );
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when the ingestion pipeline last finished."
        );
        describe_gauge!(
            "ingest_consecutive_failures",
            "Failed attempt sequences since the last success."
        );
    });
}
