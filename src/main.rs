//! Rescaler CLI - batch image rescaler
//!
//! Rescales every PNG and JPEG under a source tree into a destination
//! directory, under one scheduling strategy or all four for comparison.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use rescaler::parallel::{ProgressTracker, ProgressUpdate};
use rescaler::{init_with_config, BatchReport, Config, Orchestrator, Strategy};

/// Rescaler - batch image rescaler
#[derive(Parser)]
#[command(
    name = "rescaler",
    version,
    about = "Rescale every PNG/JPEG under a directory and compare scheduling strategies",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory to scan recursively for .png, .jpg and .jpeg files
    #[arg(value_name = "SOURCE")]
    source: Option<PathBuf>,

    /// Output directory (one subdirectory per strategy with --strategy all)
    #[arg(value_name = "DEST")]
    dest: Option<PathBuf>,

    /// Scale factor applied to width and height
    #[arg(short, long, value_name = "FACTOR")]
    scale: Option<f64>,

    /// Scheduling strategy, or "all" to compare every strategy
    #[arg(long, default_value = "all", value_parser = parse_strategy_choice, value_name = "STRATEGY")]
    strategy: StrategyChoice,

    /// JPEG output quality (1-100)
    #[arg(short, long, value_name = "QUALITY")]
    quality: Option<u8>,

    /// Worker threads for the parallel-worker strategy (default: auto-detect)
    #[arg(short, long, value_name = "COUNT")]
    threads: Option<usize>,

    /// Maximum concurrently running files for task-per-file (0 = unbounded)
    #[arg(long, value_name = "COUNT")]
    max_in_flight: Option<usize>,

    /// Configuration file path (.toml or .yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print run reports as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path
        #[arg(short, long, default_value = "rescaler.toml")]
        output: PathBuf,
        /// Use YAML format instead of TOML
        #[arg(long)]
        yaml: bool,
    },
}

#[derive(Clone, Copy, Debug)]
enum StrategyChoice {
    All,
    One(Strategy),
}

impl StrategyChoice {
    fn strategies(self) -> Vec<Strategy> {
        match self {
            Self::All => Strategy::ALL.to_vec(),
            Self::One(strategy) => vec![strategy],
        }
    }
}

fn parse_strategy_choice(s: &str) -> Result<StrategyChoice, String> {
    if s == "all" {
        return Ok(StrategyChoice::All);
    }
    s.parse().map(StrategyChoice::One).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let outcome = match cli.command {
        Some(Commands::ExampleConfig { ref output, yaml }) => {
            generate_example_config(output, yaml).map(|()| true)
        }
        None => run(&cli).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Run the batch; `Ok(false)` means it completed with failed or skipped files
async fn run(cli: &Cli) -> anyhow::Result<bool> {
    let (Some(source), Some(dest)) = (&cli.source, &cli.dest) else {
        bail!("SOURCE and DEST are required. Run with --help for usage information");
    };

    let config = load_config(cli)?;
    init_with_config(&config)?;

    let orchestrator = Orchestrator::new(config.processing.clone())?;
    let cancel = orchestrator.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, letting in-flight files finish");
            cancel.cancel();
        }
    });

    info!("Source: {:?}", source);
    info!("Destination: {:?}", dest);
    info!("Scale: {}", config.processing.scale);

    let progress = (!cli.json && !cli.quiet).then(|| spawn_progress(orchestrator.progress()));

    let result = match cli.strategy {
        StrategyChoice::One(strategy) => orchestrator
            .run(source, dest, strategy)
            .await
            .map(|report| vec![report]),
        StrategyChoice::All => {
            orchestrator
                .compare(source, dest, &cli.strategy.strategies())
                .await
        }
    };

    if let Some((bar, handle)) = progress {
        handle.abort();
        bar.finish_and_clear();
    }

    let reports = result.context("Batch run failed")?;

    if cli.json {
        let summaries: Vec<_> = reports.iter().map(BatchReport::summary).collect();
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if !cli.quiet {
        print_summary(&reports);
    }

    let cancelled = orchestrator.cancel_token().is_cancelled();
    Ok(!cancelled && reports.iter().all(BatchReport::is_success))
}

/// Config file (or defaults) with command-line overrides applied
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let processing = &mut config.processing;
    if let Some(scale) = cli.scale {
        processing.scale = scale;
    }
    if let Some(quality) = cli.quality {
        processing.quality = quality;
    }
    if cli.threads.is_some() {
        processing.threads = cli.threads;
    }
    if cli.max_in_flight.is_some() {
        processing.max_in_flight = cli.max_in_flight;
    }

    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    config.validate()?;
    Ok(config)
}

fn spawn_progress(tracker: Arc<ProgressTracker>) -> (ProgressBar, JoinHandle<()>) {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg} {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut updates = tracker.subscribe();
    let handle = tokio::spawn({
        let bar = bar.clone();
        async move {
            loop {
                match updates.recv().await {
                    Ok(ProgressUpdate::Started { strategy, total_files }) => {
                        bar.reset();
                        bar.set_length(total_files as u64);
                        bar.set_message(strategy.to_string());
                    }
                    Ok(ProgressUpdate::FileCompleted { .. } | ProgressUpdate::FileSkipped { .. }) => {
                        bar.inc(1);
                    }
                    Ok(ProgressUpdate::Finished { strategy }) => {
                        bar.set_message(format!("{strategy} done"));
                    }
                    Err(RecvError::Lagged(_)) => {
                        let state = tracker.get_state();
                        bar.set_position(state.settled() as u64);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    (bar, handle)
}

/// Generate example configuration file
fn generate_example_config(output: &Path, yaml: bool) -> anyhow::Result<()> {
    let output = if yaml && !matches!(
        output.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    ) {
        output.with_extension("yaml")
    } else {
        output.to_path_buf()
    };

    Config::default().to_file(&output)?;

    let format = if yaml { "YAML" } else { "TOML" };
    println!(
        "{}: Generated example {} configuration: {}",
        style("Success").green().bold(),
        format,
        output.display()
    );

    Ok(())
}

/// Print processing summary
fn print_summary(reports: &[BatchReport]) {
    println!();
    println!("{}", style("Processing Summary:").bold());

    for report in reports {
        println!();
        println!("{}", style(report.strategy).cyan().bold());
        println!("  {}: {}", style("Processed").green(), report.succeeded());
        if !report.failures.is_empty() {
            println!("  {}: {}", style("Failed").red(), report.failures.len());
            for failure in &report.failures {
                println!("    {}", style(failure).dim());
            }
        }
        if !report.skipped.is_empty() {
            println!("  {}: {}", style("Skipped").yellow(), report.skipped.len());
        }
        println!("  {}: {:.3}s", style("Elapsed").blue(), report.elapsed.as_secs_f64());
        if report.succeeded() > 0 {
            println!("  {}: {:.1} files/sec", style("Speed").cyan(), report.files_per_second());
        }
    }

    if reports.len() > 1 {
        if let Some(fastest) = reports
            .iter()
            .filter(|r| r.is_success())
            .min_by_key(|r| r.elapsed)
        {
            println!();
            println!("{}: {}", style("Fastest").green().bold(), fastest.strategy);
        }
    }
}
