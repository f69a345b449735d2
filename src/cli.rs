//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::KindFilter;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Workout Companion - batched workout metric summaries
///
/// Aggregates energy, distance, steps and active minutes for every workout
/// in a health export, caches the result on disk, and prints a report.
///
/// Examples:
///   workout-companion --export export.json
///   workout-companion --export export.json --force --batch-size 20
///   workout-companion --export export.json --kind all --since-days 7
///   workout-companion --export export.json --format json --output week.json
///   workout-companion --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Health export (JSON) to read workouts and samples from
    #[arg(short, long, value_name = "FILE", env = "WORKOUT_EXPORT")]
    pub export: Option<PathBuf>,

    /// Ignore the cached snapshot and fetch everything again
    #[arg(short, long)]
    pub force: bool,

    /// Workouts aggregated concurrently per batch
    #[arg(long, value_name = "COUNT")]
    pub batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long, value_name = "MS")]
    pub batch_delay_ms: Option<u64>,

    /// Activity kinds to include
    #[arg(long, value_name = "KIND")]
    pub kind: Option<KindFilter>,

    /// Only include workouts from the last N days
    #[arg(long, value_name = "DAYS")]
    pub since_days: Option<u32>,

    /// Durable snapshot file
    ///
    /// Defaults to summaries.json in the platform data directory
    #[arg(long, value_name = "FILE", env = "WORKOUT_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .workout-companion.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Do not draw a progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Generate a default .workout-companion.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.batch_size == Some(0) {
            return Err("Batch size must be at least 1".to_string());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref export) = self.export {
            if !export.exists() {
                return Err(format!(
                    "Health export does not exist: {}",
                    export.display()
                ));
            }
            if export.is_dir() {
                return Err(format!(
                    "Health export is a directory: {}",
                    export.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the `[general] verbose` setting; `--quiet` wins
    /// over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Progress bars only make sense when logging is not silenced.
    pub fn show_progress(&self) -> bool {
        !self.no_progress && !self.quiet
    }
}
