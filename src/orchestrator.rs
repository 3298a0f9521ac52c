//! End-to-end run: locate sources, prepare the output directory, execute

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ProcessingConfig;
use crate::error::{Result, RescaleError};
use crate::parallel::{BatchExecutor, BatchReport, CancelToken, ProgressTracker, Strategy};
use crate::processing::{ImageLocator, OutputManager, ResizeTask};

/// Drives a complete batch from a source tree to an output directory.
pub struct Orchestrator {
    config: ProcessingConfig,
    locator: ImageLocator,
    output: OutputManager,
    executor: BatchExecutor,
}

impl Orchestrator {
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            executor: BatchExecutor::new(config.clone()),
            config,
            locator: ImageLocator::new(),
            output: OutputManager::new(),
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.executor = self.executor.with_cancel_token(cancel);
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        self.executor.cancel_token()
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        self.executor.progress()
    }

    /// Find every qualifying image under `source`
    pub async fn locate(&self, source: &Path) -> Result<Vec<PathBuf>> {
        let locator = self.locator.clone();
        let source = source.to_path_buf();
        let concurrent = self.config.concurrent_scan;

        tokio::task::spawn_blocking(move || {
            if concurrent {
                locator.find_images_concurrent(&source)
            } else {
                locator.find_images(&source)
            }
        })
        .await
        .map_err(|e| RescaleError::parallel(format!("Directory scan failed: {}", e)))?
    }

    /// Create or clean `dest` on the blocking pool
    async fn prepare(&self, dest: &Path) -> Result<()> {
        let output = self.output;
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || output.prepare(&dest))
            .await
            .map_err(|e| RescaleError::parallel(format!("Output preparation failed: {}", e)))?
    }

    /// Map sources to tasks writing into `dest`.
    ///
    /// Sources sharing a basename stem map to the same output file; the last
    /// one written wins.
    pub fn plan(&self, files: Vec<PathBuf>, dest: &Path) -> Vec<ResizeTask> {
        let tasks: Vec<ResizeTask> = files
            .into_iter()
            .map(|source| ResizeTask::new(source, dest, self.config.scale))
            .collect();

        let mut by_dest: HashMap<&Path, Vec<&Path>> = HashMap::new();
        for task in &tasks {
            by_dest.entry(task.dest.as_path()).or_default().push(task.source.as_path());
        }
        for (dest, sources) in by_dest.iter().filter(|(_, sources)| sources.len() > 1) {
            warn!("{} sources map to {:?}: {:?}", sources.len(), dest, sources);
        }

        tasks
    }

    /// Rescale every image under `source` into `dest` using `strategy`.
    ///
    /// The source tree is scanned before `dest` is touched, so a missing
    /// source leaves the output untouched.
    pub async fn run(&self, source: &Path, dest: &Path, strategy: Strategy) -> Result<BatchReport> {
        let files = self.locate(source).await?;
        info!("Found {} image(s) under {:?}", files.len(), source);

        self.prepare(dest).await?;
        let tasks = self.plan(files, dest);

        self.executor.execute(tasks, strategy).await
    }

    /// Run each strategy in turn, writing to `dest_root/<strategy-name>`
    pub async fn compare(
        &self,
        source: &Path,
        dest_root: &Path,
        strategies: &[Strategy],
    ) -> Result<Vec<BatchReport>> {
        let files = self.locate(source).await?;
        info!(
            "Comparing {} strategies over {} image(s)",
            strategies.len(),
            files.len()
        );

        let mut reports = Vec::with_capacity(strategies.len());
        for &strategy in strategies {
            if self.cancel_token().is_cancelled() {
                warn!("Cancelled before {} started", strategy);
                break;
            }

            let dest = dest_root.join(strategy.name());
            self.prepare(&dest).await?;
            let tasks = self.plan(files.clone(), &dest);
            reports.push(self.executor.execute(tasks, strategy).await?);
        }

        Ok(reports)
    }
}
