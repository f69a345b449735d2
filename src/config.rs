//! Configuration file handling.
//!
//! This module handles loading, validating, and merging configuration from
//! `.workout-companion.toml` files.

use crate::cache::CacheConfig;
use crate::cli::OutputFormat;
use crate::error::CompanionError;
use crate::models::{KindFilter, WorkoutQuery};
use crate::pipeline::SchedulerConfig;
use crate::store::DurableSnapshot;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = ".workout-companion.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Workout source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Batch scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Durable snapshot settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Report format.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Where workouts come from and which ones are selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the JSON health export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_path: Option<PathBuf>,

    /// Activity kinds to include.
    #[serde(default)]
    pub kind: KindFilter,

    /// Lookback window in days; unset means all history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_days: Option<u32>,

    /// Skip workouts shorter than this.
    #[serde(default = "default_min_duration")]
    pub min_duration_seconds: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            export_path: None,
            kind: KindFilter::default(),
            lookback_days: None,
            min_duration_seconds: default_min_duration(),
        }
    }
}

fn default_min_duration() -> f64 {
    1.0
}

/// Batch scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Workouts aggregated concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Timeout for a single metric request in seconds.
    #[serde(default = "default_metric_timeout")]
    pub metric_timeout_seconds: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            metric_timeout_seconds: default_metric_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_delay_ms() -> u64 {
    5000
}

fn default_metric_timeout() -> u64 {
    30
}

/// Durable snapshot settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Snapshot file; defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings; only values
    /// the CLI actually provides are overridden.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref export) = args.export {
            self.source.export_path = Some(export.clone());
        }
        if let Some(kind) = args.kind {
            self.source.kind = kind;
        }
        if let Some(days) = args.since_days {
            self.source.lookback_days = Some(days);
        }

        if let Some(size) = args.batch_size {
            self.scheduler.batch_size = size;
        }
        if let Some(delay) = args.batch_delay_ms {
            self.scheduler.batch_delay_ms = delay;
        }

        if let Some(ref snapshot) = args.snapshot {
            self.store.snapshot_path = Some(snapshot.clone());
        }

        if let Some(format) = args.format {
            self.general.format = format;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Check settings that would otherwise fail mid-run.
    pub fn validate(&self) -> std::result::Result<(), CompanionError> {
        if self.scheduler.batch_size == 0 {
            return Err(CompanionError::config("batch_size must be at least 1"));
        }
        if self.scheduler.metric_timeout_seconds == 0 {
            return Err(CompanionError::config(
                "metric_timeout_seconds must be at least 1",
            ));
        }
        if self.source.export_path.is_none() {
            return Err(CompanionError::config(
                "no health export given; use --export or [source] export_path",
            ));
        }
        if self.source.min_duration_seconds < 0.0 {
            return Err(CompanionError::config(
                "min_duration_seconds cannot be negative",
            ));
        }
        Ok(())
    }

    /// Workout selection for the source.
    pub fn query(&self) -> WorkoutQuery {
        WorkoutQuery {
            kind: self.source.kind,
            lookback_days: self.source.lookback_days,
            min_duration_seconds: self.source.min_duration_seconds,
        }
    }

    /// Settings for the workout cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            query: self.query(),
            scheduler: SchedulerConfig {
                batch_size: self.scheduler.batch_size,
                batch_delay: Duration::from_millis(self.scheduler.batch_delay_ms),
            },
            metric_timeout: Duration::from_secs(self.scheduler.metric_timeout_seconds),
        }
    }

    /// Durable snapshot location.
    pub fn snapshot(&self) -> DurableSnapshot {
        match self.store.snapshot_path {
            Some(ref path) => DurableSnapshot::new(path.clone()),
            None => DurableSnapshot::in_data_dir(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
