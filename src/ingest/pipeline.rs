// src/ingest/pipeline.rs
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::ingest::merge;
use crate::ingest::normalize;
use crate::ingest::store::EntityStore;
use crate::ingest::types::{
    EntityKind, ImportResult, RawBatch, SourceClient, SourceError, SourceQuery,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on concurrently in-flight source fetches.
    pub max_in_flight: usize,
    /// Wall-clock budget for a single fetch, applied after the concurrency
    /// permit is acquired so queue time never eats into it.
    pub source_timeout: Duration,
    /// Candidates scoring below this never reach dedup or the store.
    pub confidence_threshold: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            source_timeout: Duration::from_secs(20),
            confidence_threshold: 0.4,
        }
    }
}

/// One fan-out/merge pass over all configured sources.
///
/// `run` never fails as a whole: per-source and per-entity failures are
/// absorbed into `ImportResult.errors` and the caller decides what a
/// zero-yield run means.
pub struct IngestionPipeline {
    sources: Vec<Arc<dyn SourceClient>>,
    store: Arc<dyn EntityStore>,
    cfg: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        sources: Vec<Arc<dyn SourceClient>>,
        store: Arc<dyn EntityStore>,
        cfg: PipelineConfig,
    ) -> Self {
        Self { sources, store, cfg }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub async fn run(&self, query: &SourceQuery) -> ImportResult {
        let t0 = Instant::now();

        let settled = self.fetch_all(query).await;

        let mut errors = Vec::new();
        let mut candidates = Vec::new();
        let mut dropped = 0usize;

        // Source-list order here keeps merge tie-breaking deterministic.
        for (idx, slot) in settled.into_iter().enumerate() {
            let source_id = self.sources[idx].id();
            match slot {
                Some(Ok(batch)) => {
                    let normalized = normalize::normalize_batch(&batch);
                    tracing::debug!(
                        source = source_id,
                        records = batch.records.len(),
                        entities = normalized.entities.len(),
                        dropped = normalized.dropped,
                        "batch normalized"
                    );
                    dropped += normalized.dropped;
                    candidates.extend(normalized.entities);
                }
                Some(Err(err)) => {
                    tracing::warn!(source = source_id, kind = ?err.kind, error = %err.message, "source failed");
                    counter!("ingest_source_errors_total").increment(1);
                    errors.push(err.to_string());
                }
                None => {
                    // fetch task panicked or was cancelled
                    counter!("ingest_source_errors_total").increment(1);
                    errors.push(format!("{source_id}: fetch task aborted"));
                }
            }
        }

        counter!("ingest_candidates_total").increment(candidates.len() as u64);
        counter!("ingest_unmappable_total").increment(dropped as u64);

        let outcome = merge::merge(candidates, self.cfg.confidence_threshold);
        counter!("ingest_duplicates_total").increment(outcome.duplicates as u64);
        counter!("ingest_below_threshold_total").increment(outcome.below_threshold as u64);

        let mut result = ImportResult::default();
        for entity in &outcome.kept {
            match self.store.save(entity).await {
                Ok(()) => match entity.kind() {
                    EntityKind::Startup => result.startups += 1,
                    EntityKind::Opportunity => result.opportunities += 1,
                    EntityKind::Event => result.events += 1,
                },
                Err(e) => {
                    tracing::warn!(entity = entity.display_name(), error = %e.message, "persist failed");
                    errors.push(e.to_string());
                }
            }
        }
        result.errors = errors;

        counter!("ingest_kept_total").increment(result.total() as u64);
        histogram!("ingest_run_duration_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        tracing::info!(
            startups = result.startups,
            opportunities = result.opportunities,
            events = result.events,
            duplicates = outcome.duplicates,
            below_threshold = outcome.below_threshold,
            errors = result.errors.len(),
            "ingestion pass finished"
        );

        result
    }

    /// Fan out to every source with bounded parallelism and wait for all of
    /// them to settle. Returns one slot per source, in source-list order.
    async fn fetch_all(&self, query: &SourceQuery) -> Vec<Option<Result<RawBatch, SourceError>>> {
        let semaphore = Arc::new(Semaphore::new(self.cfg.max_in_flight.max(1)));
        let mut join_set = JoinSet::new();

        for (idx, source) in self.sources.iter().enumerate() {
            let source = Arc::clone(source);
            let query = query.clone();
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.cfg.source_timeout;

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = match tokio::time::timeout(timeout, source.fetch(&query)).await {
                    Ok(r) => r,
                    Err(_) => Err(SourceError::timeout(
                        source.id(),
                        format!("no response within {} ms", timeout.as_millis()),
                    )),
                };
                (idx, result)
            });
        }

        let mut settled: Vec<Option<Result<RawBatch, SourceError>>> =
            (0..self.sources.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((idx, result)) => settled[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "source fetch task failed to join"),
            }
        }
        settled
    }
}
