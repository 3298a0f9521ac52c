//! Execution strategies for running units of work over a file list
//!
//! All four strategies share one kernel ([`process_task`] / [`render`]) and
//! differ only in how units are scheduled. Per-unit failures never abort a
//! run: every unit settles first and the failures are reported together.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::ProcessingConfig;
use crate::error::{ErrorContext, Result, RescaleError};
use crate::processing::{process_task, render, ResizeEngine, ResizeTask, UnitOutcome};

pub mod progress;
pub mod scheduler;

pub use progress::*;
pub use scheduler::*;

/// Scheduling policy for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// One file fully processed before the next begins
    Sequential,
    /// One async task per file, all in flight together
    TaskPerFile,
    /// Fixed worker pool sized to the hardware
    ParallelWorker,
    /// Partitioned list, each partition spawning its own per-file units
    DataParallel,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::TaskPerFile,
        Strategy::ParallelWorker,
        Strategy::DataParallel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::TaskPerFile => "task-per-file",
            Self::ParallelWorker => "parallel-worker",
            Self::DataParallel => "data-parallel",
        }
    }

    /// Maximum number of units running at once (`None` = unbounded)
    pub fn concurrency_bound(self, config: &ProcessingConfig) -> Option<usize> {
        match self {
            Self::Sequential => Some(1),
            Self::TaskPerFile => config.fan_out_limit(),
            Self::ParallelWorker => Some(config.worker_count()),
            Self::DataParallel => None,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = RescaleError;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| RescaleError::invalid_parameters(format!(
                "Unknown strategy '{}'. Use sequential, task-per-file, parallel-worker or data-parallel",
                s
            )))
    }
}

/// Run-level cancellation flag.
///
/// Once cancelled, schedulers stop issuing new units; units already running
/// finish normally so no partial file is left behind.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How one unit of work ended
#[derive(Debug)]
enum Settled {
    Done(UnitOutcome),
    Failed(RescaleError),
    Skipped(PathBuf),
}

/// Everything a unit needs, cheap to clone into tasks and threads
#[derive(Clone)]
struct UnitContext {
    engine: Arc<ResizeEngine>,
    progress: Arc<ProgressTracker>,
    cancel: CancelToken,
    quality: u8,
}

impl UnitContext {
    /// Run one unit on the current thread; panics are contained to the unit
    fn run(&self, task: &ResizeTask) -> Settled {
        self.progress.start_file();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            process_task(task, &self.engine, self.quality)
        }))
        .unwrap_or_else(|payload| Err(RescaleError::UnitPanicked {
            path: task.source.clone(),
            message: panic_message(payload.as_ref()),
        }));

        self.record(&task.source, result)
    }

    /// Run one unit with async file I/O and CPU work on the blocking pool
    async fn run_async(&self, task: ResizeTask) -> Settled {
        self.progress.start_file();
        let source = task.source.clone();
        let result = self.process_async(task).await;
        self.record(&source, result)
    }

    async fn process_async(&self, task: ResizeTask) -> Result<UnitOutcome> {
        let start = Instant::now();
        let source = task.source.clone();

        let data = tokio::fs::read(&task.source).await.with_file_context(&task.source)?;

        let engine = Arc::clone(&self.engine);
        let quality = self.quality;
        let (task, encoded) = tokio::task::spawn_blocking(move || {
            let encoded = render(&task, &data, &engine, quality);
            (task, encoded)
        })
        .await
        .map_err(|e| RescaleError::UnitPanicked {
            path: source,
            message: e.to_string(),
        })?;
        let encoded = encoded?;

        tokio::fs::write(&task.dest, &encoded.bytes)
            .await
            .map_err(|e| RescaleError::write(&task.source, &task.dest, e))?;

        Ok(task.outcome(&encoded, start.elapsed()))
    }

    fn record(&self, source: &Path, result: Result<UnitOutcome>) -> Settled {
        match result {
            Ok(outcome) => {
                debug!(
                    "Wrote {:?} ({} -> {}, {} bytes)",
                    outcome.dest, outcome.source_dims, outcome.dest_dims, outcome.bytes_written
                );
                self.progress.complete_file(source.to_path_buf(), true);
                Settled::Done(outcome)
            }
            Err(e) => {
                warn!("Failed to process {:?}: {}", source, e);
                self.progress.complete_file(source.to_path_buf(), false);
                Settled::Failed(e)
            }
        }
    }

    fn skip(&self, task: &ResizeTask) -> Settled {
        self.progress.skip_file(task.source.clone());
        Settled::Skipped(task.source.clone())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs a task list under a chosen strategy and reports every outcome.
pub struct BatchExecutor {
    engine: Arc<ResizeEngine>,
    config: ProcessingConfig,
    progress: Arc<ProgressTracker>,
    cancel: CancelToken,
}

impl BatchExecutor {
    /// Create an executor from processing configuration
    pub fn new(config: ProcessingConfig) -> Self {
        Self {
            engine: Arc::new(ResizeEngine::from_config(&config)),
            config,
            progress: Arc::new(ProgressTracker::new()),
            cancel: CancelToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Get current progress
    pub fn get_progress(&self) -> ProgressState {
        self.progress.get_state()
    }

    fn context(&self) -> UnitContext {
        UnitContext {
            engine: Arc::clone(&self.engine),
            progress: Arc::clone(&self.progress),
            cancel: self.cancel.clone(),
            quality: self.config.quality,
        }
    }

    /// Process every task under `strategy` and wait for all units to settle.
    ///
    /// Per-file failures are collected in the report, not returned as `Err`;
    /// an `Err` here means the scheduler itself broke down.
    pub async fn execute(&self, tasks: Vec<ResizeTask>, strategy: Strategy) -> Result<BatchReport> {
        let start = Instant::now();
        let total = tasks.len();

        info!(
            "Running {} over {} file(s) (concurrency bound: {})",
            strategy,
            total,
            strategy
                .concurrency_bound(&self.config)
                .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
        );
        self.progress.start(strategy, total);

        let settled = match strategy {
            Strategy::Sequential => {
                let ctx = self.context();
                run_blocking(move || run_sequential(&ctx, tasks)).await?
            }
            Strategy::TaskPerFile => self.run_task_per_file(tasks).await,
            Strategy::ParallelWorker => {
                let ctx = self.context();
                let pool = WorkerPool::new(self.config.worker_count());
                run_blocking(move || run_worker_pool(&ctx, &pool, tasks)).await?
            }
            Strategy::DataParallel => {
                let ctx = self.context();
                let partition_size = self.partition_size(total);
                run_blocking(move || run_data_parallel(&ctx, tasks, partition_size)).await?
            }
        };

        self.progress.finish(strategy);
        let report = BatchReport::collect(strategy, total, settled, start.elapsed());

        info!(
            "{} finished in {:.2}s: {} written, {} failed, {} skipped",
            strategy,
            report.elapsed.as_secs_f64(),
            report.succeeded(),
            report.failures.len(),
            report.skipped.len()
        );

        Ok(report)
    }

    fn partition_size(&self, total: usize) -> usize {
        self.config
            .partition_size
            .unwrap_or_else(|| total.div_ceil(num_cpus::get().max(1)))
            .max(1)
    }

    async fn run_task_per_file(&self, tasks: Vec<ResizeTask>) -> Vec<Settled> {
        let limiter = self.config.fan_out_limit().map(|n| Arc::new(Semaphore::new(n)));
        let mut settled = Vec::with_capacity(tasks.len());
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let ctx = self.context();
            if ctx.cancel.is_cancelled() {
                settled.push(ctx.skip(&task));
                continue;
            }

            let source = task.source.clone();
            let limiter = limiter.clone();
            let handle = tokio::spawn(async move {
                let _permit = match limiter {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(_) => return ctx.skip(&task),
                    },
                    None => None,
                };

                // Cancellation may have fired while waiting for a slot
                if ctx.cancel.is_cancelled() {
                    return ctx.skip(&task);
                }
                ctx.run_async(task).await
            });
            handles.push((source, handle));
        }

        let (sources, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = futures::future::join_all(handles).await;

        for (source, result) in sources.into_iter().zip(joined) {
            settled.push(result.unwrap_or_else(|e| {
                Settled::Failed(RescaleError::UnitPanicked {
                    path: source,
                    message: format!("Task join error: {}", e),
                })
            }));
        }

        settled
    }
}

async fn run_blocking<F>(f: F) -> Result<Vec<Settled>>
where
    F: FnOnce() -> Vec<Settled> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RescaleError::parallel(format!("Scheduler thread failed: {}", e)))
}

fn run_sequential(ctx: &UnitContext, tasks: Vec<ResizeTask>) -> Vec<Settled> {
    tasks
        .iter()
        .map(|task| {
            if ctx.cancel.is_cancelled() {
                ctx.skip(task)
            } else {
                ctx.run(task)
            }
        })
        .collect()
}

fn run_worker_pool(ctx: &UnitContext, pool: &WorkerPool, tasks: Vec<ResizeTask>) -> Vec<Settled> {
    let run = pool.run(tasks, &ctx.cancel, |task| ctx.run(&task));

    let mut settled = run.results;
    settled.extend(run.skipped.iter().map(|task| ctx.skip(task)));
    settled
}

fn run_data_parallel(ctx: &UnitContext, tasks: Vec<ResizeTask>, partition_size: usize) -> Vec<Settled> {
    let settled = Mutex::new(Vec::with_capacity(tasks.len()));

    tasks.par_chunks(partition_size).for_each(|partition| {
        rayon::scope(|s| {
            for task in partition {
                let settled = &settled;
                // Every unit is queued up front; the token is read when it starts
                s.spawn(move |_| {
                    let unit = if ctx.cancel.is_cancelled() {
                        ctx.skip(task)
                    } else {
                        ctx.run(task)
                    };
                    settled.lock().unwrap_or_else(PoisonError::into_inner).push(unit);
                });
            }
        });
    });

    settled.into_inner().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of one strategy run over a task list
#[derive(Debug)]
pub struct BatchReport {
    pub strategy: Strategy,
    pub total: usize,
    pub outcomes: Vec<UnitOutcome>,
    pub failures: Vec<RescaleError>,
    pub skipped: Vec<PathBuf>,
    pub elapsed: Duration,
}

impl BatchReport {
    fn collect(strategy: Strategy, total: usize, settled: Vec<Settled>, elapsed: Duration) -> Self {
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        for unit in settled {
            match unit {
                Settled::Done(outcome) => outcomes.push(outcome),
                Settled::Failed(error) => failures.push(error),
                Settled::Skipped(source) => skipped.push(source),
            }
        }

        // Completion order is arbitrary; report in path order
        outcomes.sort_by(|a, b| a.source.cmp(&b.source));
        failures.sort_by(|a, b| a.file_path().cmp(&b.file_path()));
        skipped.sort();

        Self {
            strategy,
            total,
            outcomes,
            failures,
            skipped,
            elapsed,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.len()
    }

    /// True when every unit completed
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }

    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.is_zero() {
            return 0.0;
        }
        self.succeeded() as f64 / self.elapsed.as_secs_f64()
    }

    /// Convert to an error if any unit failed or was skipped
    pub fn into_result(self) -> Result<Self> {
        if !self.failures.is_empty() {
            return Err(RescaleError::Batch {
                strategy: self.strategy,
                failures: self.failures,
            });
        }
        if !self.skipped.is_empty() {
            return Err(RescaleError::Cancelled {
                skipped: self.skipped.len(),
            });
        }
        Ok(self)
    }

    /// Serializable summary for machine-readable output
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            strategy: self.strategy,
            total: self.total,
            succeeded: self.succeeded(),
            failed: self.failures.len(),
            skipped: self.skipped.len(),
            elapsed_ms: self.elapsed.as_millis(),
            failures: self
                .failures
                .iter()
                .map(|e| FailureSummary {
                    source: e.file_path().map(Path::to_path_buf),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub strategy: Strategy,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub elapsed_ms: u128,
    pub failures: Vec<FailureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub source: Option<PathBuf>,
    pub error: String,
}
