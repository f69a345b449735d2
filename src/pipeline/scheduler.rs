//! Sequential batches of concurrent workout aggregations.
//!
//! The workout set is cut into consecutive batches. Every workout in a batch
//! is aggregated concurrently; the next batch starts only after the whole
//! batch has drained and a configurable pause has elapsed.

use super::engine::AggregationEngine;
use crate::error::{CompanionError, Result};
use crate::models::{MetricKind, Workout};
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Workouts aggregated concurrently per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(5),
        }
    }
}

/// Progress for one completed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    /// Zero-based batch number.
    pub index: usize,
    /// Total batches in this run.
    pub total_batches: usize,
    /// Indices of the covered workouts in the input slice.
    pub range: Range<usize>,
    /// Metric fetches that failed and were left at zero.
    pub failed_metrics: usize,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.range.len()
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub batches_completed: usize,
    pub workouts_aggregated: usize,
    pub failed_metrics: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Runs aggregation over a workout set in sequential batches.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    batch_delay: Duration,
}

impl BatchScheduler {
    /// Create a scheduler; a zero batch size is rejected here, not at run time.
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        if config.batch_size == 0 {
            return Err(CompanionError::config("batch size must be at least 1"));
        }
        Ok(Self {
            batch_size: config.batch_size,
            batch_delay: config.batch_delay,
        })
    }

    /// Aggregate every workout, one batch at a time.
    ///
    /// `on_batch_done` fires after each batch has fully drained, in batch
    /// order. `on_all_done` fires exactly once at the end, also when the run
    /// was cancelled or the set was empty.
    pub async fn run_all<B, A>(
        &self,
        engine: &Arc<AggregationEngine>,
        workouts: &[Workout],
        cancel: &CancellationToken,
        mut on_batch_done: B,
        on_all_done: A,
    ) -> RunReport
    where
        B: FnMut(&BatchReport),
        A: FnOnce(&RunReport),
    {
        let started = Instant::now();
        let ranges = batch_ranges(workouts.len(), self.batch_size);
        let total_batches = ranges.len();

        let mut report = RunReport {
            batches_completed: 0,
            workouts_aggregated: 0,
            failed_metrics: 0,
            cancelled: false,
            elapsed: Duration::ZERO,
        };

        if total_batches > 0 {
            info!(
                "Aggregating {} workouts in {} batches of up to {}",
                workouts.len(),
                total_batches,
                self.batch_size
            );
        }

        for (index, range) in ranges.into_iter().enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.batch_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                info!("Cancelled before batch {} of {}", index + 1, total_batches);
                report.cancelled = true;
                break;
            }

            let failed_metrics = run_batch(engine, &workouts[range.clone()]).await;

            let batch = BatchReport {
                index,
                total_batches,
                range,
                failed_metrics,
            };
            debug!(
                "Batch {}/{} done: workouts {}..{}, {} failed metrics",
                index + 1,
                total_batches,
                batch.range.start,
                batch.range.end,
                failed_metrics
            );

            report.batches_completed += 1;
            report.workouts_aggregated += batch.len();
            report.failed_metrics += failed_metrics;
            on_batch_done(&batch);
        }

        report.elapsed = started.elapsed();
        on_all_done(&report);
        report
    }
}

/// Aggregate one batch concurrently and wait for all of it.
///
/// Returns the number of metric fetches that failed.
async fn run_batch(engine: &Arc<AggregationEngine>, batch: &[Workout]) -> usize {
    let mut tasks = JoinSet::new();
    for workout in batch {
        let engine = engine.clone();
        let workout = workout.clone();
        tasks.spawn(async move { engine.aggregate_detailed(&workout).await.failed.len() });
    }

    let mut failed = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(count) => failed += count,
            Err(e) => {
                error!("Aggregation task aborted: {}", e);
                failed += MetricKind::ALL.len();
            }
        }
    }
    failed
}

/// Consecutive half-open index ranges of at most `size` covering `0..len`.
pub fn batch_ranges(len: usize, size: usize) -> Vec<Range<usize>> {
    if size == 0 {
        return Vec::new();
    }
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::{workouts, ScriptedProvider};
    use crate::store::SummaryStore;

    fn scheduler(batch_size: usize) -> BatchScheduler {
        BatchScheduler::new(SchedulerConfig {
            batch_size,
            batch_delay: Duration::ZERO,
        })
        .unwrap()
    }

    fn engine(provider: Arc<ScriptedProvider>) -> Arc<AggregationEngine> {
        Arc::new(AggregationEngine::new(
            provider,
            Arc::new(SummaryStore::new()),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn test_batch_ranges() {
        assert_eq!(batch_ranges(25, 10), vec![0..10, 10..20, 20..25]);
        assert_eq!(batch_ranges(20, 10), vec![0..10, 10..20]);
        assert_eq!(batch_ranges(3, 10), vec![0..3]);
        assert!(batch_ranges(0, 10).is_empty());
        assert!(batch_ranges(5, 0).is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_config_error() {
        let err = BatchScheduler::new(SchedulerConfig {
            batch_size: 0,
            batch_delay: Duration::ZERO,
        })
        .unwrap_err();
        assert!(matches!(err, CompanionError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_twenty_five_workouts_in_three_batches() {
        let input = workouts(25);
        let provider = Arc::new(ScriptedProvider::new(input.clone()));
        let engine = engine(provider.clone());

        let mut batches = Vec::new();
        let mut all_done = Vec::new();
        let report = scheduler(10)
            .run_all(
                &engine,
                &input,
                &CancellationToken::new(),
                |b| batches.push(b.clone()),
                |r| all_done.push(r.clone()),
            )
            .await;

        let sizes: Vec<_> = batches.iter().map(BatchReport::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        let ranges: Vec<_> = batches.iter().map(|b| b.range.clone()).collect();
        assert_eq!(ranges, vec![0..10, 10..20, 20..25]);
        assert!(batches.iter().enumerate().all(|(i, b)| b.index == i));

        assert_eq!(all_done.len(), 1);
        assert_eq!(all_done[0], report);
        assert_eq!(report.batches_completed, 3);
        assert_eq!(report.workouts_aggregated, 25);
        assert!(!report.cancelled);
        assert_eq!(engine.store().len(), 25);
        assert_eq!(provider.sum_calls(), 100);
    }

    #[tokio::test]
    async fn test_all_done_fires_after_every_batch() {
        let input = workouts(7);
        let engine = engine(Arc::new(ScriptedProvider::new(input.clone())));
        let events = std::sync::Mutex::new(Vec::new());

        scheduler(3)
            .run_all(
                &engine,
                &input,
                &CancellationToken::new(),
                |b| events.lock().unwrap().push(format!("batch-{}", b.index)),
                |_| events.lock().unwrap().push("all".to_string()),
            )
            .await;

        assert_eq!(
            events.into_inner().unwrap(),
            vec!["batch-0", "batch-1", "batch-2", "all"]
        );
    }

    #[tokio::test]
    async fn test_empty_set_completes_immediately() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let engine = engine(provider.clone());
        let mut batch_calls = 0;
        let mut all_calls = 0;

        let report = scheduler(10)
            .run_all(
                &engine,
                &[],
                &CancellationToken::new(),
                |_| batch_calls += 1,
                |_| all_calls += 1,
            )
            .await;

        assert_eq!(batch_calls, 0);
        assert_eq!(all_calls, 1);
        assert_eq!(report.batches_completed, 0);
        assert_eq!(provider.sum_calls(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_raised() {
        let input = workouts(4);
        let provider = Arc::new(ScriptedProvider::new(input.clone()));
        provider.fail_metric(MetricKind::Distance, &input[2].id);
        let engine = engine(provider);

        let mut failed_per_batch = Vec::new();
        let report = scheduler(2)
            .run_all(
                &engine,
                &input,
                &CancellationToken::new(),
                |b| failed_per_batch.push(b.failed_metrics),
                |_| {},
            )
            .await;

        assert_eq!(failed_per_batch, vec![0, 1]);
        assert_eq!(report.failed_metrics, 1);
        assert_eq!(engine.store().get(&input[2].id).unwrap().distance, 0.0);
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_batch_size() {
        let input = workouts(12);
        let provider = Arc::new(
            ScriptedProvider::new(input.clone()).with_latency(Duration::from_millis(20)),
        );
        let engine = engine(provider.clone());

        scheduler(3)
            .run_all(&engine, &input, &CancellationToken::new(), |_| {}, |_| {})
            .await;

        // Four metrics per workout, three workouts per batch.
        assert!(provider.max_in_flight() <= 12);
        assert!(provider.max_in_flight() > 1);
        assert_eq!(provider.sum_calls(), 48);
    }

    #[tokio::test]
    async fn test_cancel_stops_new_batches() {
        let input = workouts(9);
        let provider = Arc::new(ScriptedProvider::new(input.clone()));
        let engine = engine(provider.clone());
        let cancel = CancellationToken::new();
        let scheduler = BatchScheduler::new(SchedulerConfig {
            batch_size: 3,
            batch_delay: Duration::from_secs(60),
        })
        .unwrap();

        let mut reports = Vec::new();
        let mut finished = None;
        let report = scheduler
            .run_all(
                &engine,
                &input,
                &cancel,
                |b| {
                    reports.push(b.index);
                    cancel.cancel();
                },
                |r| finished = Some(r.cancelled),
            )
            .await;

        assert_eq!(reports, vec![0]);
        assert_eq!(finished, Some(true));
        assert!(report.cancelled);
        assert_eq!(engine.store().len(), 3);
        assert_eq!(provider.sum_calls(), 12);
        assert!(report.elapsed < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_panicking_task_counts_as_four_failures() {
        let input = workouts(3);
        let provider = Arc::new(ScriptedProvider::new(input.clone()));
        provider.panic_for(&input[1].id);
        let engine = engine(provider);

        let mut batches = Vec::new();
        let report = scheduler(3)
            .run_all(
                &engine,
                &input,
                &CancellationToken::new(),
                |b| batches.push(b.clone()),
                |_| {},
            )
            .await;

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].failed_metrics, 4);
        assert_eq!(report.failed_metrics, 4);
        assert_eq!(report.workouts_aggregated, 3);
        assert!(!report.cancelled);
        for workout in [&input[0], &input[2]] {
            assert!(engine
                .store()
                .get(&workout.id)
                .unwrap()
                .unpopulated_metrics()
                .is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_between_batches_only() {
        let input = workouts(5);
        let engine = engine(Arc::new(ScriptedProvider::new(input.clone())));
        let delay = Duration::from_secs(5);
        let scheduler = BatchScheduler::new(SchedulerConfig {
            batch_size: 2,
            batch_delay: delay,
        })
        .unwrap();

        let started = Instant::now();
        let mut finished_at = Vec::new();
        let report = scheduler
            .run_all(
                &engine,
                &input,
                &CancellationToken::new(),
                |_| finished_at.push(started.elapsed()),
                |_| {},
            )
            .await;

        // Three batches, two pauses, nothing after the last batch.
        assert_eq!(report.batches_completed, 3);
        assert!(finished_at[0] < delay);
        assert!(finished_at[1] >= delay && finished_at[1] < delay * 2);
        assert!(finished_at[2] >= delay * 2 && finished_at[2] < delay * 3);
        assert!(report.elapsed >= delay * 2);
        assert!(report.elapsed < delay * 3);
    }
}
