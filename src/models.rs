//! Data models for the workout pipeline.
//!
//! This module contains the core data structures shared by the provider,
//! the aggregation pipeline, the summary store, and the report generator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Activity type of a recorded workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Running,
    Walking,
    Cycling,
    #[serde(other)]
    Other,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityKind::Running => write!(f, "Running"),
            ActivityKind::Walking => write!(f, "Walking"),
            ActivityKind::Cycling => write!(f, "Cycling"),
            ActivityKind::Other => write!(f, "Other"),
        }
    }
}

/// Which activity kinds a workout query selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    /// Every recorded workout
    All,
    /// Running workouts only (default)
    #[default]
    Running,
    /// Walking workouts only
    Walking,
    /// Cycling workouts only
    Cycling,
    /// Workouts of any other type
    Other,
}

impl KindFilter {
    /// Returns true if a workout of `kind` passes this filter.
    pub fn matches(&self, kind: ActivityKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Running => kind == ActivityKind::Running,
            KindFilter::Walking => kind == ActivityKind::Walking,
            KindFilter::Cycling => kind == ActivityKind::Cycling,
            KindFilter::Other => kind == ActivityKind::Other,
        }
    }
}

/// One of the aggregate measurements tracked per workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    EnergyBurned,
    Distance,
    Steps,
    ActiveMinutes,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::EnergyBurned => write!(f, "Energy Burned"),
            MetricKind::Distance => write!(f, "Distance"),
            MetricKind::Steps => write!(f, "Steps"),
            MetricKind::ActiveMinutes => write!(f, "Active Minutes"),
        }
    }
}

impl MetricKind {
    /// Every metric kind, in the order the engine requests them.
    pub const ALL: [MetricKind; 4] = [
        MetricKind::EnergyBurned,
        MetricKind::Distance,
        MetricKind::Steps,
        MetricKind::ActiveMinutes,
    ];

    /// Unit the summary field is expressed in.
    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::EnergyBurned => "kcal",
            MetricKind::Distance => "mi",
            MetricKind::Steps => "count",
            MetricKind::ActiveMinutes => "min",
        }
    }
}

/// Closed time interval a workout covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Returns true if `[start, end]` lies entirely within this range.
    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start >= self.start && end <= self.end
    }
}

/// Optional metadata recorded alongside a workout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutMetadata {
    /// Average metabolic equivalent (kcal / kg / hr) over the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_mets: Option<f64>,
}

/// One completed exercise session, as reported by the workout source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    /// Opaque unique identifier.
    pub id: String,
    /// Activity type.
    pub kind: ActivityKind,
    /// Session start.
    pub start: DateTime<Utc>,
    /// Session end.
    pub end: DateTime<Utc>,
    /// Recorded duration in seconds.
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<WorkoutMetadata>,
}

impl Workout {
    /// The range metric queries for this workout are scoped to.
    pub fn time_range(&self) -> TimeRange {
        TimeRange {
            start: self.start,
            end: self.end,
        }
    }

    /// Metadata-derived intensity, 0 when not recorded.
    pub fn average_mets(&self) -> f64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.average_mets)
            .unwrap_or(0.0)
    }
}

/// Per-workout accumulated record of every metric kind plus pass-through fields.
///
/// Metric fields default to 0 until a fetch populates them, so a summary is
/// never absent or in an error state, only incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Average METs from the workout metadata.
    #[serde(default)]
    pub mets: f64,
    /// Active energy in kilocalories.
    #[serde(default)]
    pub energy_burned: f64,
    #[serde(default)]
    pub steps: f64,
    /// Distance in miles.
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub active_minutes: f64,
}

impl WorkoutSummary {
    /// Creates an empty summary seeded with the workout's pass-through fields.
    pub fn from_workout(workout: &Workout) -> Self {
        Self {
            id: workout.id.clone(),
            start: workout.start,
            end: workout.end,
            duration_seconds: workout.duration_seconds,
            mets: workout.average_mets(),
            ..Self::default()
        }
    }

    /// Returns the value currently held for a metric kind.
    pub fn metric(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::EnergyBurned => self.energy_burned,
            MetricKind::Distance => self.distance,
            MetricKind::Steps => self.steps,
            MetricKind::ActiveMinutes => self.active_minutes,
        }
    }

    /// Writes exactly the field belonging to `kind`.
    pub fn set_metric(&mut self, kind: MetricKind, value: f64) {
        match kind {
            MetricKind::EnergyBurned => self.energy_burned = value,
            MetricKind::Distance => self.distance = value,
            MetricKind::Steps => self.steps = value,
            MetricKind::ActiveMinutes => self.active_minutes = value,
        }
    }

    /// Name of the first numeric field that is NaN or infinite.
    pub fn non_finite_field(&self) -> Option<&'static str> {
        [
            ("duration_seconds", self.duration_seconds),
            ("mets", self.mets),
            ("energy_burned", self.energy_burned),
            ("steps", self.steps),
            ("distance", self.distance),
            ("active_minutes", self.active_minutes),
        ]
        .into_iter()
        .find(|(_, value)| !value.is_finite())
        .map(|(name, _)| name)
    }

    /// Metric kinds still at their zero default.
    pub fn unpopulated_metrics(&self) -> Vec<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .filter(|kind| self.metric(*kind) == 0.0)
            .collect()
    }
}

/// Mapping from workout identifier to its summary.
///
/// Ordered by identifier so the serialized form is deterministic.
pub type SummarySet = BTreeMap<String, WorkoutSummary>;

/// Selection of workouts requested from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutQuery {
    pub kind: KindFilter,
    /// Lookback window in days; `None` means unbounded history.
    pub lookback_days: Option<u32>,
    /// Workouts shorter than this are skipped.
    pub min_duration_seconds: f64,
}

impl Default for WorkoutQuery {
    fn default() -> Self {
        Self::all_running()
    }
}

impl WorkoutQuery {
    /// Every running workout ever recorded.
    pub fn all_running() -> Self {
        Self {
            kind: KindFilter::Running,
            lookback_days: None,
            min_duration_seconds: 1.0,
        }
    }

    /// Any workout from the last seven days.
    #[cfg(test)]
    pub fn recent_week() -> Self {
        Self {
            kind: KindFilter::All,
            lookback_days: Some(7),
            min_duration_seconds: 1.0,
        }
    }

    /// Earliest start time admitted relative to `now`.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lookback_days
            .map(|days| now - Duration::days(i64::from(days)))
    }

    /// Returns true if `workout` belongs in the result set at time `now`.
    pub fn matches(&self, workout: &Workout, now: DateTime<Utc>) -> bool {
        if !self.kind.matches(workout.kind) {
            return false;
        }
        if workout.duration_seconds < self.min_duration_seconds {
            return false;
        }
        match self.since(now) {
            Some(since) => workout.start >= since && workout.end <= now,
            None => true,
        }
    }
}
