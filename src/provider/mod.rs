//! Interfaces to the external health-data source.
//!
//! The pipeline only depends on the two traits here; `ExportProvider`
//! implements both over a JSON health export.

pub mod export;
#[cfg(test)]
pub mod testing;

pub use export::ExportProvider;

use crate::error::Result;
use crate::models::{MetricKind, TimeRange, Workout, WorkoutQuery};
use async_trait::async_trait;

/// Cumulative-sum metric queries against the health store.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Sum of `kind` samples for one workout. No samples yields `Ok(0.0)`.
    async fn sum(&self, kind: MetricKind, workout_id: &str, range: TimeRange) -> Result<f64>;
}

/// Workout listing against the health store.
#[async_trait]
pub trait WorkoutSource: Send + Sync {
    /// Workouts matching `query`, most recent first.
    async fn list_recent(&self, query: &WorkoutQuery) -> Result<Vec<Workout>>;

    /// Stable identifier of the source, recorded with durable snapshots.
    fn source_id(&self) -> String;
}
