//! Rescaler - Batch Image Rescaler
//!
//! Finds every PNG and JPEG under a directory tree, rescales each one by a
//! fixed factor onto a transparent canvas and writes it out as a JPEG. The
//! same batch can be scheduled four ways so their throughput can be compared:
//!
//! - **Sequential**: one file at a time
//! - **Task-per-file**: one async task per file with a bounded fan-out
//! - **Parallel-worker**: a fixed pool of threads fed from a bounded queue
//! - **Data-parallel**: the file list split into partitions, one unit per file
//!
//! A failing file never stops its siblings. Every unit settles first and the
//! failures are reported together.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rescaler::{Orchestrator, ProcessingConfig, Strategy};
//! use std::path::Path;
//!
//! # async fn run() -> rescaler::Result<()> {
//! let orchestrator = Orchestrator::new(ProcessingConfig::default())?;
//! let report = orchestrator
//!     .run(Path::new("photos"), Path::new("resized"), Strategy::DataParallel)
//!     .await?;
//!
//! println!("{} written in {:.2}s", report.succeeded(), report.elapsed.as_secs_f64());
//! report.into_result()?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod parallel;
pub mod processing;

// Re-export commonly used types
pub use config::{Config, FilterKind, LoggingConfig, ProcessingConfig};
pub use error::{Result, RescaleError};
pub use orchestrator::Orchestrator;
pub use parallel::{BatchExecutor, BatchReport, CancelToken, Strategy};
pub use processing::{Dimensions, ImageLocator, OutputManager, ResizeEngine, ResizeTask, UnitOutcome};

use tracing::info;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging from `RUST_LOG`, defaulting to `info`.
///
/// Safe to call more than once; only the first subscriber is installed.
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
    {
        info!("Rescaler v{} initialized", VERSION);
    }

    log_capabilities();
    Ok(())
}

/// Initialize with custom configuration
pub fn init_with_config(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .map_err(|e| RescaleError::config(format!(
            "Invalid log level '{}': {}",
            config.logging.level, e
        )))?;

    let installed = if config.logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    };

    if installed {
        info!("Rescaler v{} initialized with custom config", VERSION);
    }

    log_capabilities();
    Ok(())
}

fn log_capabilities() {
    info!("Detected {} logical CPU cores", num_cpus::get());
    info!(
        "Image codecs: PNG {}, JPEG {}",
        image::ImageFormat::Png.can_read(),
        image::ImageFormat::Jpeg.can_write()
    );
}
