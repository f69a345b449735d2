//! File-backed health-data provider.
//!
//! Reads a JSON health export holding workouts and quantity samples and
//! answers both workout listings and per-workout metric sums from it.

use super::{MetricsProvider, WorkoutSource};
use crate::error::{CompanionError, Result};
use crate::models::{MetricKind, TimeRange, Workout, WorkoutQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const METERS_PER_MILE: f64 = 1609.344;

/// One quantity sample in the export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantitySample {
    pub kind: MetricKind,
    /// Workout the sample was recorded for, if the recorder linked it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_id: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Sample value; kcal, meters, step count, or minutes by kind.
    pub value: f64,
}

impl QuantitySample {
    fn belongs_to(&self, workout_id: &str, range: &TimeRange) -> bool {
        match self.workout_id.as_deref() {
            Some(id) => id == workout_id,
            None => range.contains(self.start, self.end),
        }
    }

    /// Value converted to the summary unit of its kind.
    fn summary_value(&self) -> f64 {
        match self.kind {
            MetricKind::Distance => self.value / METERS_PER_MILE,
            _ => self.value,
        }
    }
}

/// Root of the export document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthExport {
    #[serde(default)]
    pub workouts: Vec<Workout>,
    #[serde(default)]
    pub samples: Vec<QuantitySample>,
}

/// Provider backed by a health export file on disk.
pub struct ExportProvider {
    path: PathBuf,
    loaded: RwLock<Option<Arc<HealthExport>>>,
    now: Option<DateTime<Utc>>,
}

impl ExportProvider {
    /// Create a provider for the export at `path`. Nothing is read until queried.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: RwLock::new(None),
            now: None,
        }
    }

    /// Pin the clock used for lookback windows.
    #[allow(dead_code)] // Used by tests and reproducible runs
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the export from disk, replacing the cached copy.
    pub async fn reload(&self) -> Result<Arc<HealthExport>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            CompanionError::unavailable(format!(
                "cannot read health export {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let export: HealthExport = serde_json::from_slice(&bytes).map_err(|e| {
            CompanionError::unavailable(format!(
                "health export {} is malformed: {}",
                self.path.display(),
                e
            ))
        })?;

        debug!(
            "Loaded health export with {} workouts and {} samples",
            export.workouts.len(),
            export.samples.len()
        );

        let export = Arc::new(export);
        *self.loaded.write().await = Some(export.clone());
        Ok(export)
    }

    async fn export(&self) -> Result<Arc<HealthExport>> {
        if let Some(export) = self.loaded.read().await.as_ref() {
            return Ok(export.clone());
        }
        self.reload().await
    }
}

#[async_trait]
impl WorkoutSource for ExportProvider {
    async fn list_recent(&self, query: &WorkoutQuery) -> Result<Vec<Workout>> {
        // Each listing starts a refresh cycle, so pick up a newer export.
        let export = self.reload().await?;
        let now = self.now.unwrap_or_else(Utc::now);

        let mut workouts: Vec<Workout> = export
            .workouts
            .iter()
            .filter(|w| query.matches(w, now))
            .cloned()
            .collect();

        workouts.sort_by(|a, b| b.end.cmp(&a.end));
        Ok(workouts)
    }

    fn source_id(&self) -> String {
        self.path().display().to_string()
    }
}

#[async_trait]
impl MetricsProvider for ExportProvider {
    async fn sum(&self, kind: MetricKind, workout_id: &str, range: TimeRange) -> Result<f64> {
        let export = self.export().await?;

        Ok(export
            .samples
            .iter()
            .filter(|s| s.kind == kind && s.belongs_to(workout_id, &range))
            .map(QuantitySample::summary_value)
            .sum())
    }
}
