//! Stale-while-revalidate cache over the aggregation pipeline.
//!
//! `WorkoutCache` owns the durable snapshot and the in-flight flag. A
//! non-forced refresh is served from the snapshot when one is readable;
//! otherwise the full pipeline runs and its result replaces the snapshot.

use crate::error::{CompanionError, Result};
use crate::models::{SummarySet, WorkoutQuery};
use crate::pipeline::{AggregationEngine, BatchReport, BatchScheduler, SchedulerConfig};
use crate::provider::{MetricsProvider, WorkoutSource};
use crate::store::{DurableSnapshot, SnapshotOrigin, SummaryStore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings for one cache instance.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub query: WorkoutQuery,
    pub scheduler: SchedulerConfig,
    /// Upper bound on a single metric request.
    pub metric_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query: WorkoutQuery::default(),
            scheduler: SchedulerConfig::default(),
            metric_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the summaries of a refresh came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshSource {
    /// Read back from the durable snapshot.
    Snapshot,
    /// Aggregated from the provider during this refresh.
    Fetched,
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Refreshed {
    pub summaries: Arc<SummarySet>,
    pub source: RefreshSource,
}

/// Marks the cache as fetching for as long as it is alive.
struct FetchingGuard<'a>(&'a AtomicBool);

impl<'a> FetchingGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for FetchingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates refreshes and exposes the latest summary set.
pub struct WorkoutCache {
    source: Arc<dyn WorkoutSource>,
    provider: Arc<dyn MetricsProvider>,
    scheduler: BatchScheduler,
    query: WorkoutQuery,
    metric_timeout: Duration,
    snapshot: DurableSnapshot,
    current: RwLock<Arc<SummarySet>>,
    current_source: Mutex<Option<RefreshSource>>,
    last_error: Mutex<Option<String>>,
    fetching: AtomicBool,
    refresh_lock: tokio::sync::Mutex<()>,
    /// Number of finished refresh runs; lets waiters detect a run they joined.
    completed_runs: AtomicU64,
    cancel: Mutex<CancellationToken>,
}

impl WorkoutCache {
    /// Create a cache. Invalid scheduler settings fail here.
    pub fn new(
        source: Arc<dyn WorkoutSource>,
        provider: Arc<dyn MetricsProvider>,
        snapshot: DurableSnapshot,
        config: CacheConfig,
    ) -> Result<Self> {
        if config.metric_timeout.is_zero() {
            return Err(CompanionError::config("metric timeout must be positive"));
        }
        let scheduler = BatchScheduler::new(config.scheduler)?;

        Ok(Self {
            source,
            provider,
            scheduler,
            query: config.query,
            metric_timeout: config.metric_timeout,
            snapshot,
            current: RwLock::new(Arc::new(SummarySet::new())),
            current_source: Mutex::new(None),
            last_error: Mutex::new(None),
            fetching: AtomicBool::new(false),
            refresh_lock: tokio::sync::Mutex::new(()),
            completed_runs: AtomicU64::new(0),
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    /// The summary set most recently produced by a successful refresh.
    pub fn current_snapshot(&self) -> Arc<SummarySet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Where the current summaries came from; `None` before the first success.
    pub fn current_source(&self) -> Option<RefreshSource> {
        *self
            .current_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a refresh is running.
    pub fn is_fetching(&self) -> bool {
        self.fetching.load(Ordering::SeqCst)
    }

    /// Message of the last failed refresh, cleared by the next success.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the in-flight refresh after its current batch drains.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    pub fn snapshot_path(&self) -> &std::path::Path {
        self.snapshot.path()
    }

    /// Refresh the summaries. See [`WorkoutCache::refresh_with_progress`].
    #[allow(dead_code)] // The CLI always reports progress
    pub async fn refresh(&self, force: bool) -> Result<Arc<SummarySet>> {
        self.refresh_with_progress(force, |_| {})
            .await
            .map(|refreshed| refreshed.summaries)
    }

    /// Refresh the summaries, reporting each finished batch to `on_batch`.
    ///
    /// Without `force`, a readable durable snapshot saved for the same source
    /// and query is returned as is. With `force`, or when the snapshot is
    /// absent, corrupt or from another source or query, the workout list is
    /// fetched, aggregated, persisted and returned.
    ///
    /// A call made while another refresh is running waits for that run and
    /// returns its outcome instead of starting a second one.
    pub async fn refresh_with_progress<F>(&self, force: bool, on_batch: F) -> Result<Refreshed>
    where
        F: FnMut(&BatchReport),
    {
        let observed = self.completed_runs.load(Ordering::SeqCst);
        let _permit = self.refresh_lock.lock().await;

        if self.completed_runs.load(Ordering::SeqCst) != observed {
            debug!("Joined an in-flight refresh");
            return match self.last_error() {
                Some(message) => Err(CompanionError::RefreshFailed(message)),
                None => Ok(Refreshed {
                    summaries: self.current_snapshot(),
                    source: self.current_source().unwrap_or(RefreshSource::Fetched),
                }),
            };
        }

        let _fetching = FetchingGuard::engage(&self.fetching);
        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        let outcome = self.load_or_fetch(force, &cancel, on_batch).await;

        match &outcome {
            Ok(refreshed) => {
                *self.current.write().unwrap_or_else(PoisonError::into_inner) =
                    refreshed.summaries.clone();
                *self
                    .current_source
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(refreshed.source);
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
            }
            Err(e) => {
                error!("Refresh failed: {}", e);
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(e.to_string());
            }
        }

        self.completed_runs.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    async fn load_or_fetch<F>(
        &self,
        force: bool,
        cancel: &CancellationToken,
        on_batch: F,
    ) -> Result<Refreshed>
    where
        F: FnMut(&BatchReport),
    {
        let origin = self.origin();

        if !force {
            match self.snapshot.load(&origin).await {
                Ok(set) => {
                    info!(
                        "Loaded {} summaries from {}",
                        set.len(),
                        self.snapshot.path().display()
                    );
                    return Ok(Refreshed {
                        summaries: Arc::new(set),
                        source: RefreshSource::Snapshot,
                    });
                }
                Err(e) if e.is_storage_recoverable() => {
                    info!("{}; running a full fetch", e);
                }
                Err(e) => return Err(e),
            }
        }

        let set = self.fetch_all(&origin, cancel, on_batch).await?;
        Ok(Refreshed {
            summaries: Arc::new(set),
            source: RefreshSource::Fetched,
        })
    }

    fn origin(&self) -> SnapshotOrigin {
        SnapshotOrigin {
            source: self.source.source_id(),
            query: self.query.clone(),
        }
    }

    async fn fetch_all<F>(
        &self,
        origin: &SnapshotOrigin,
        cancel: &CancellationToken,
        on_batch: F,
    ) -> Result<SummarySet>
    where
        F: FnMut(&BatchReport),
    {
        let started = Instant::now();

        let workouts = self.source.list_recent(&self.query).await?;
        info!("Fetched {} workouts from the source", workouts.len());

        let store = Arc::new(SummaryStore::new());
        let engine = Arc::new(AggregationEngine::new(
            self.provider.clone(),
            store.clone(),
            self.metric_timeout,
        ));

        let run = self
            .scheduler
            .run_all(&engine, &workouts, cancel, on_batch, |run| {
                info!(
                    "Aggregated {} workouts in {} batches ({} metric fetches skipped)",
                    run.workouts_aggregated, run.batches_completed, run.failed_metrics
                );
            })
            .await;

        if run.cancelled {
            return Err(CompanionError::Cancelled);
        }

        debug!("Store holds {} summaries", store.len());
        let set = store.snapshot();
        if let Err(e) = self.snapshot.save(origin, &set).await {
            warn!(
                "Could not persist summaries to {}: {}",
                self.snapshot.path().display(),
                e
            );
        }

        info!(
            "Refreshed {} summaries in {:.2}s",
            set.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(set)
    }
}
