//! Per-workout metric fan-out and merge.

use crate::error::CompanionError;
use crate::models::{MetricKind, Workout, WorkoutSummary};
use crate::provider::MetricsProvider;
use crate::store::SummaryStore;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Result of aggregating one workout.
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub summary: WorkoutSummary,
    /// Metric kinds whose fetch failed and were left at zero.
    pub failed: Vec<MetricKind>,
}

/// Fetches every metric kind for a workout and merges them into the store.
pub struct AggregationEngine {
    provider: Arc<dyn MetricsProvider>,
    store: Arc<SummaryStore>,
    metric_timeout: Duration,
}

impl AggregationEngine {
    pub fn new(
        provider: Arc<dyn MetricsProvider>,
        store: Arc<SummaryStore>,
        metric_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            metric_timeout,
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &Arc<SummaryStore> {
        &self.store
    }

    /// Aggregate one workout. Never fails; failed metrics stay at zero.
    #[allow(dead_code)] // Scheduler uses the detailed form for failure counts
    pub async fn aggregate(&self, workout: &Workout) -> WorkoutSummary {
        self.aggregate_detailed(workout).await.summary
    }

    /// Aggregate one workout and report which metric kinds failed.
    pub async fn aggregate_detailed(&self, workout: &Workout) -> Aggregated {
        // Re-aggregating a workout replaces whatever the store held for it.
        let seed = WorkoutSummary::from_workout(workout);
        self.store.upsert(&workout.id, |entry| *entry = seed);

        let fetches = MetricKind::ALL
            .into_iter()
            .map(|kind| self.fetch_into_store(workout, kind));
        let outcomes = join_all(fetches).await;

        let failed: Vec<MetricKind> = MetricKind::ALL
            .into_iter()
            .zip(outcomes)
            .filter_map(|(kind, ok)| (!ok).then_some(kind))
            .collect();

        let summary = self
            .store
            .get(&workout.id)
            .unwrap_or_else(|| WorkoutSummary::from_workout(workout));

        debug!(
            "Aggregated workout {} ({} of {} metrics)",
            workout.id,
            MetricKind::ALL.len() - failed.len(),
            MetricKind::ALL.len()
        );

        Aggregated { summary, failed }
    }

    /// Fetch one metric and write its field. Returns false if the fetch failed.
    async fn fetch_into_store(&self, workout: &Workout, kind: MetricKind) -> bool {
        let request = self.provider.sum(kind, &workout.id, workout.time_range());

        let result = match tokio::time::timeout(self.metric_timeout, request).await {
            Ok(Ok(value)) if !value.is_finite() => Err(CompanionError::metric(
                kind,
                &workout.id,
                format!("provider returned non-finite value {}", value),
            )),
            Ok(result) => result,
            Err(_) => Err(CompanionError::metric(
                kind,
                &workout.id,
                format!("timed out after {:?}", self.metric_timeout),
            )),
        };

        match result {
            Ok(value) => {
                self.store
                    .upsert(&workout.id, |entry| entry.set_metric(kind, value));
                true
            }
            Err(e) => {
                warn!("Skipping {} for workout {}: {}", kind, workout.id, e);
                false
            }
        }
    }
}
