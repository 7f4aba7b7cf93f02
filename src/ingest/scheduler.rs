// src/ingest/scheduler.rs
//
// Process-scoped ingestion scheduler. All schedule state lives behind one
// mutex; the run slot is claimed with a compare-and-set on `running`, so a
// scheduled tick and a manual trigger can never execute concurrently.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::ingest::pipeline::IngestionPipeline;
use crate::ingest::types::{ImportResult, SourceQuery};

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Gap between scheduled runs.
    pub interval: Duration,
    /// Zero-yield retries after the initial attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts. Linear, not exponential; the worst
    /// case for one run is interval-independent:
    /// `source_timeout * (max_retries + 1) + retry_delay * max_retries`.
    pub retry_delay: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            max_retries: 2,
            retry_delay: Duration::from_secs(30),
        }
    }
}

/// Returned by `trigger()` when a run (scheduled or manual) holds the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyRunningError;

impl fmt::Display for AlreadyRunningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ingestion already running")
    }
}

impl std::error::Error for AlreadyRunningError {}

/// Schedule state. Only the scheduler mutates this, always under its mutex;
/// everything else sees snapshots.
#[derive(Debug, Clone, Default)]
pub struct ScheduleState {
    pub enabled: bool,
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_result: Option<ImportResult>,
}

impl ScheduleState {
    /// Claim the run slot. `running == true` means some run holds it.
    fn begin_run(&mut self) -> Result<(), AlreadyRunningError> {
        if self.running {
            return Err(AlreadyRunningError);
        }
        self.running = true;
        Ok(())
    }

    /// Release the slot and record the outcome.
    fn finish_run(&mut self, now: DateTime<Utc>, result: ImportResult, failed: bool) {
        self.running = false;
        self.last_run_at = Some(now);
        if failed {
            self.consecutive_failures += 1;
        } else {
            self.consecutive_failures = 0;
        }
        self.last_result = Some(result);
    }

    fn arm(&mut self, now: DateTime<Utc>, interval: Duration) {
        self.enabled = true;
        self.next_run_at = Some(now + interval);
    }

    fn disarm(&mut self) {
        self.enabled = false;
        self.next_run_at = None;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfigView {
    pub interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Read-only snapshot for the status surface. Never blocks on a run.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub interval_ms: u64,
    pub consecutive_failures: u32,
    pub last_result: Option<ImportResult>,
    pub config: ScheduleConfigView,
}

struct Shared {
    cfg: ScheduleConfig,
    state: ScheduleState,
}

struct Inner {
    pipeline: IngestionPipeline,
    query: SourceQuery,
    shared: Mutex<Shared>,
    wakeup: Notify,
    shutdown: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().expect("scheduler mutex poisoned")
    }

    /// Run the pipeline with the configured zero-yield retry policy.
    /// Returns the final result and whether the attempt sequence failed.
    async fn execute_with_retry(&self, cfg: &ScheduleConfig) -> (ImportResult, bool) {
        let mut attempt = 0u32;
        loop {
            counter!("ingest_runs_total").increment(1);
            let result = self.pipeline.run(&self.query).await;

            if result.is_zero_yield() && attempt < cfg.max_retries {
                attempt += 1;
                counter!("ingest_retries_total").increment(1);
                tracing::warn!(
                    attempt,
                    max_retries = cfg.max_retries,
                    "zero-yield ingestion, retrying"
                );
                tokio::time::sleep(cfg.retry_delay).await;
                continue;
            }

            let failed = result.is_zero_yield();
            if failed {
                counter!("ingest_failed_runs_total").increment(1);
            }
            gauge!("ingest_last_run_ts").set(Utc::now().timestamp() as f64);
            return (result, failed);
        }
    }

    /// One scheduled firing. Skips when disabled, not yet due, or when a
    /// manual run holds the slot (the tick is rescheduled, never queued).
    async fn scheduled_tick(&self) {
        let cfg = {
            let mut shared = self.lock();
            if !shared.state.enabled {
                return;
            }
            let now = Utc::now();
            match shared.state.next_run_at {
                Some(at) if at <= now => {}
                _ => return, // woken early; the loop recomputes its wait
            }
            if shared.state.begin_run().is_err() {
                let interval = shared.cfg.interval;
                shared.state.next_run_at = Some(now + interval);
                tracing::warn!("scheduled tick skipped, a manual run is in flight");
                return;
            }
            shared.cfg.clone()
        };

        let (result, failed) = self.execute_with_retry(&cfg).await;

        let mut shared = self.lock();
        let now = Utc::now();
        shared.state.finish_run(now, result, failed);
        if failed {
            gauge!("ingest_consecutive_failures").set(shared.state.consecutive_failures as f64);
        } else {
            gauge!("ingest_consecutive_failures").set(0.0);
        }
        // stop() mid-run leaves the schedule disarmed
        if shared.state.enabled {
            let interval = shared.cfg.interval;
            shared.state.next_run_at = Some(now + interval);
        }
    }
}

/// Handle to the single scheduler of the process. Cheap to clone; the admin
/// router and the timer loop share one `Inner`.
#[derive(Clone)]
pub struct IngestionScheduler {
    inner: Arc<Inner>,
}

impl IngestionScheduler {
    pub fn new(pipeline: IngestionPipeline, query: SourceQuery, cfg: ScheduleConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pipeline,
                query,
                shared: Mutex::new(Shared {
                    cfg,
                    state: ScheduleState::default(),
                }),
                wakeup: Notify::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Spawn the timer loop. One loop per scheduler; it parks while the
    /// schedule is disabled and wakes on `start`/`stop`/`set_config`.
    pub fn spawn_loop(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            loop {
                if inner.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let wait = {
                    let shared = inner.lock();
                    if !shared.state.enabled {
                        None
                    } else {
                        shared
                            .state
                            .next_run_at
                            .map(|due| (due - Utc::now()).to_std().unwrap_or(Duration::ZERO))
                    }
                };

                match wait {
                    None => inner.wakeup.notified().await,
                    Some(d) if d > Duration::ZERO => {
                        tokio::select! {
                            _ = tokio::time::sleep(d) => inner.scheduled_tick().await,
                            _ = inner.wakeup.notified() => {} // recompute wait
                        }
                    }
                    Some(_) => inner.scheduled_tick().await,
                }
            }
            tracing::info!("ingestion scheduler loop stopped");
        })
    }

    /// Enable the schedule. Idempotent; an enabled scheduler keeps its
    /// existing `next_run_at`.
    pub fn start(&self) {
        {
            let mut shared = self.inner.lock();
            if shared.state.enabled {
                return;
            }
            let interval = shared.cfg.interval;
            shared.state.arm(Utc::now(), interval);
            tracing::info!(interval_secs = interval.as_secs(), "ingestion schedule enabled");
        }
        self.inner.wakeup.notify_one();
    }

    /// Disable the schedule. Idempotent. An in-flight run completes; no new
    /// run is scheduled.
    pub fn stop(&self) {
        {
            let mut shared = self.inner.lock();
            if !shared.state.enabled {
                return;
            }
            shared.state.disarm();
            tracing::info!("ingestion schedule disabled");
        }
        self.inner.wakeup.notify_one();
    }

    /// Run the pipeline now, through the same retry policy as a scheduled
    /// run. Fails fast when any run already holds the slot. Leaves the timer
    /// schedule untouched.
    pub async fn trigger(&self) -> Result<ImportResult, AlreadyRunningError> {
        let cfg = {
            let mut shared = self.inner.lock();
            shared.state.begin_run()?;
            shared.cfg.clone()
        };
        counter!("ingest_manual_triggers_total").increment(1);

        let (result, failed) = self.inner.execute_with_retry(&cfg).await;

        let mut shared = self.inner.lock();
        shared.state.finish_run(Utc::now(), result.clone(), failed);
        Ok(result)
    }

    /// Replace the schedule config between runs. When the schedule is
    /// enabled the next firing is recomputed from the new interval.
    pub fn set_config(&self, cfg: ScheduleConfig) {
        {
            let mut shared = self.inner.lock();
            let enabled = shared.state.enabled;
            shared.cfg = cfg;
            if enabled {
                let interval = shared.cfg.interval;
                shared.state.next_run_at = Some(Utc::now() + interval);
            }
        }
        self.inner.wakeup.notify_one();
    }

    pub fn status(&self) -> ScheduleStatus {
        let shared = self.inner.lock();
        ScheduleStatus {
            enabled: shared.state.enabled,
            running: shared.state.running,
            last_run_at: shared.state.last_run_at,
            next_run_at: shared.state.next_run_at,
            interval_ms: shared.cfg.interval.as_millis() as u64,
            consecutive_failures: shared.state.consecutive_failures,
            last_result: shared.state.last_result.clone(),
            config: ScheduleConfigView {
                interval_ms: shared.cfg.interval.as_millis() as u64,
                max_retries: shared.cfg.max_retries,
                retry_delay_ms: shared.cfg.retry_delay.as_millis() as u64,
            },
        }
    }

    /// Graceful teardown: the loop exits after any in-flight tick completes.
    /// Never force-kills a run.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wakeup.notify_one();
    }
}
