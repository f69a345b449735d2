//! Scripted provider for pipeline tests.

use super::{MetricsProvider, WorkoutSource};
use crate::error::{CompanionError, Result};
use crate::models::{ActivityKind, MetricKind, TimeRange, Workout, WorkoutQuery};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Builds `count` running workouts, one hour apart, most recent first.
pub fn workouts(count: usize) -> Vec<Workout> {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let start = base - Duration::hours(i as i64);
            Workout {
                id: format!("wk-{:03}", i),
                kind: ActivityKind::Running,
                start,
                end: start + Duration::minutes(30),
                duration_seconds: 1800.0,
                metadata: None,
            }
        })
        .collect()
}

/// Deterministic metric value for a workout and kind.
pub fn expected_value(kind: MetricKind, workout_id: &str) -> f64 {
    let seed = workout_id.bytes().map(f64::from).sum::<f64>();
    match kind {
        MetricKind::EnergyBurned => seed * 1.5,
        MetricKind::Distance => seed / 100.0,
        MetricKind::Steps => seed * 10.0,
        MetricKind::ActiveMinutes => 30.0,
    }
}

/// In-memory provider with injectable failures and latency.
pub struct ScriptedProvider {
    workouts: Vec<Workout>,
    failures: Mutex<HashSet<(MetricKind, String)>>,
    overrides: Mutex<HashMap<(MetricKind, String), f64>>,
    panics: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    latency: std::time::Duration,
    list_calls: AtomicUsize,
    sum_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(workouts: Vec<Workout>) -> Self {
        Self {
            workouts,
            failures: Mutex::new(HashSet::new()),
            overrides: Mutex::new(HashMap::new()),
            panics: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            latency: std::time::Duration::ZERO,
            list_calls: AtomicUsize::new(0),
            sum_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fail_metric(&self, kind: MetricKind, workout_id: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert((kind, workout_id.to_string()));
    }

    /// Answer `value` instead of the expected value for one metric.
    pub fn override_metric(&self, kind: MetricKind, workout_id: &str, value: f64) {
        self.overrides
            .lock()
            .unwrap()
            .insert((kind, workout_id.to_string()), value);
    }

    /// Panic inside `sum` for every metric of one workout.
    pub fn panic_for(&self, workout_id: &str) {
        self.panics.lock().unwrap().insert(workout_id.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn sum_calls(&self) -> usize {
        self.sum_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `sum` calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkoutSource for ScriptedProvider {
    async fn list_recent(&self, _query: &WorkoutQuery) -> Result<Vec<Workout>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CompanionError::unavailable("health store not authorized"));
        }
        Ok(self.workouts.clone())
    }

    fn source_id(&self) -> String {
        "scripted".to_string()
    }
}

#[async_trait]
impl MetricsProvider for ScriptedProvider {
    async fn sum(&self, kind: MetricKind, workout_id: &str, _range: TimeRange) -> Result<f64> {
        self.sum_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panics.lock().unwrap().contains(workout_id) {
            panic!("scripted panic for {}", workout_id);
        }
        if let Some(value) = self
            .overrides
            .lock()
            .unwrap()
            .get(&(kind, workout_id.to_string()))
        {
            return Ok(*value);
        }
        let failing = self
            .failures
            .lock()
            .unwrap()
            .contains(&(kind, workout_id.to_string()));
        if failing {
            return Err(CompanionError::metric(kind, workout_id, "query failed"));
        }
        Ok(expected_value(kind, workout_id))
    }
}
