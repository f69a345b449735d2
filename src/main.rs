//! Workout Companion - batched workout metric aggregation
//!
//! A CLI tool that reads workouts from a health export, aggregates their
//! per-workout metrics in paced batches, keeps the result in a durable
//! snapshot, and renders a summary report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (configuration, unreadable export, etc.)
//!   2 - Refresh failed or was cancelled; previous summaries were reported

mod analysis;
mod cache;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod provider;
mod report;
mod store;

use anyhow::{Context, Result};
use cache::WorkoutCache;
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use provider::ExportProvider;
use report::{Report, ReportMetadata};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration first so its verbosity applies to logging
    let (mut config, config_note) = load_config(&args);
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("Workout Companion v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_note {
        ConfigNote::Loaded(path) => info!("Loaded config from {}", path),
        ConfigNote::Defaults => debug!("No config file found, using defaults"),
        ConfigNote::Unreadable(e) => warn!("Failed to load config: {}", e),
    }

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default configuration file.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "{} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Set [source] export_path, then adjust batching and filters as needed.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = args.log_level(config.general.verbose);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Refresh the summaries and write the report. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    config.validate().context("Invalid configuration")?;

    let export_path = config
        .source
        .export_path
        .clone()
        .context("No health export configured")?;
    info!("Reading workouts from {}", export_path.display());

    let export = Arc::new(ExportProvider::new(&export_path));
    let cache = Arc::new(
        WorkoutCache::new(
            export.clone(),
            export,
            config.snapshot(),
            config.cache_config(),
        )
        .context("Failed to set up the workout cache")?,
    );
    info!("Snapshot at {}", cache.snapshot_path().display());

    // Ctrl-C stops after the current batch drains
    let interrupt = {
        let cache = cache.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; stopping after the current batch");
                cache.cancel();
            }
        })
    };

    let progress = if args.show_progress() {
        Some(batch_progress_bar())
    } else {
        None
    };

    let outcome = cache
        .refresh_with_progress(args.force, |batch| {
            if let Some(ref pb) = progress {
                pb.set_length(batch.total_batches as u64);
                pb.set_position((batch.index + 1) as u64);
                if batch.failed_metrics > 0 {
                    pb.set_message(format!("{} metrics skipped", batch.failed_metrics));
                }
            }
        })
        .await;
    interrupt.abort();

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let (set, served_from, refresh_error) = match outcome {
        Ok(refreshed) => (refreshed.summaries, Some(refreshed.source), None),
        Err(e) => {
            warn!("Showing previous summaries: {}", e);
            (
                cache.current_snapshot(),
                cache.current_source(),
                Some(e.to_string()),
            )
        }
    };

    let duration = start_time.elapsed().as_secs_f64();
    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        source: export_path.display().to_string(),
        snapshot_path: cache.snapshot_path().display().to_string(),
        forced: args.force,
        served_from,
        duration_seconds: duration,
        refresh_error: refresh_error.clone(),
    };
    let report = Report::new(metadata, &set);

    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report saved to {}", path.display());
        }
        None => println!("{}", output),
    }

    info!(
        "{} workouts summarized in {:.1}s",
        report.totals.workouts, duration
    );

    Ok(if refresh_error.is_some() { 2 } else { 0 })
}

/// Progress bar counting finished batches; its length is set by the first batch.
fn batch_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    match ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] batch {pos}/{len} {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => debug!("Falling back to the default progress style: {}", e),
    }
    pb
}

/// How the configuration was obtained, logged once logging is up.
enum ConfigNote {
    Loaded(String),
    Defaults,
    Unreadable(String),
}

/// Load configuration from file or use defaults.
///
/// An explicit `--config` that cannot be read is fatal; a broken default
/// file falls back to defaults.
fn load_config(args: &Args) -> (Config, ConfigNote) {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return match Config::load(config_path) {
            Ok(config) => (config, ConfigNote::Loaded(config_path.display().to_string())),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        };
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => (config, ConfigNote::Loaded(CONFIG_FILE_NAME.to_string())),
        Ok(None) => (Config::default(), ConfigNote::Defaults),
        Err(e) => (Config::default(), ConfigNote::Unreadable(format!("{:#}", e))),
    }
}
