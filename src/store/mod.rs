//! In-memory summary store and its durable snapshot.
//!
//! Entries live in a `DashMap` keyed by workout id, so every mutation for one
//! workout holds that entry's shard lock while different workouts in a wide
//! batch rarely contend.

pub mod durable;

pub use durable::{DurableSnapshot, SnapshotOrigin};

use crate::models::{SummarySet, WorkoutSummary};
use dashmap::DashMap;

/// Concurrent map of workout id to summary.
#[derive(Default)]
pub struct SummaryStore {
    entries: DashMap<String, WorkoutSummary>,
}

impl SummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the summary for `id`, if present.
    pub fn get(&self, id: &str) -> Option<WorkoutSummary> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Apply `mutate` to the entry for `id` while holding its lock.
    ///
    /// A default entry carrying `id` is created first if none exists.
    /// Returns a copy of the entry after the mutation.
    pub fn upsert<F>(&self, id: &str, mutate: F) -> WorkoutSummary
    where
        F: FnOnce(&mut WorkoutSummary),
    {
        let mut entry = self
            .entries
            .entry(id.to_string())
            .or_insert_with(|| WorkoutSummary {
                id: id.to_string(),
                ..WorkoutSummary::default()
            });
        mutate(entry.value_mut());
        entry.value().clone()
    }

    /// Point-in-time copy of every summary.
    ///
    /// A snapshot taken mid-run may mix entries from before and after a
    /// concurrent write to another workout, but never a half-applied
    /// mutation of one entry.
    pub fn snapshot(&self) -> SummarySet {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)] // Paired with len
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricKind;
    use std::sync::Arc;

    #[test]
    fn test_upsert_creates_default_entry() {
        let store = SummaryStore::new();
        assert!(store.get("wk-1").is_none());

        let summary = store.upsert("wk-1", |s| s.set_metric(MetricKind::Steps, 10.0));
        assert_eq!(summary.id, "wk-1");
        assert_eq!(summary.steps, 10.0);
        assert_eq!(summary.energy_burned, 0.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_upsert_overwrites_never_duplicates() {
        let store = SummaryStore::new();
        store.upsert("wk-1", |s| s.steps = 1.0);
        store.upsert("wk-1", |s| s.steps = 2.0);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("wk-1").unwrap().steps, 2.0);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = SummaryStore::new();
        store.upsert("a", |s| s.distance = 1.0);
        store.upsert("b", |s| s.distance = 2.0);

        let snapshot = store.snapshot();
        store.upsert("a", |s| s.distance = 99.0);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"].distance, 1.0);
        assert_eq!(store.get("a").unwrap().distance, 99.0);
    }

    #[test]
    fn test_empty_store() {
        let store = SummaryStore::new();
        assert!(store.is_empty());
        assert!(store.snapshot().is_empty());

        store.upsert("a", |_| {});
        assert!(!store.is_empty());
    }

    #[test]
    fn test_concurrent_field_writers_do_not_race() {
        let store = Arc::new(SummaryStore::new());
        let mut handles = Vec::new();
        for w in 0..8 {
            for kind in MetricKind::ALL {
                let store = store.clone();
                handles.push(std::thread::spawn(move || {
                    let id = format!("wk-{}", w);
                    for i in 0..100 {
                        store.upsert(&id, |s| s.set_metric(kind, f64::from(i)));
                    }
                }));
            }
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 8);
        for summary in snapshot.values() {
            for kind in MetricKind::ALL {
                assert_eq!(summary.metric(kind), 99.0);
            }
        }
    }
}
