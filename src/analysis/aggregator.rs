//! Statistics over a summary set.
//!
//! This module provides utilities for ordering summaries and computing the
//! totals shown in reports.

use crate::models::{MetricKind, SummarySet, WorkoutSummary};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Totals across every summary in a set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub workouts: usize,
    pub duration_seconds: f64,
    pub energy_burned: f64,
    pub steps: f64,
    pub distance: f64,
    pub active_minutes: f64,
    /// Mean of the non-zero METs values.
    pub average_mets: f64,
    /// Summaries with at least one metric still at zero.
    pub incomplete: usize,
}

impl SummaryTotals {
    /// Compute totals for a set of summaries.
    pub fn from_summaries(set: &SummarySet) -> Self {
        let mut totals = Self {
            workouts: set.len(),
            ..Self::default()
        };
        let mut mets_sum = 0.0;
        let mut mets_count = 0usize;

        for summary in set.values() {
            totals.duration_seconds += summary.duration_seconds;
            totals.energy_burned += summary.energy_burned;
            totals.steps += summary.steps;
            totals.distance += summary.distance;
            totals.active_minutes += summary.active_minutes;

            if summary.mets > 0.0 {
                mets_sum += summary.mets;
                mets_count += 1;
            }
            if !summary.unpopulated_metrics().is_empty() {
                totals.incomplete += 1;
            }
        }

        if mets_count > 0 {
            totals.average_mets = mets_sum / mets_count as f64;
        }
        totals
    }

    /// Total for one metric kind.
    pub fn metric(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::EnergyBurned => self.energy_burned,
            MetricKind::Distance => self.distance,
            MetricKind::Steps => self.steps,
            MetricKind::ActiveMinutes => self.active_minutes,
        }
    }
}

/// Summaries ordered by end time, most recent first.
pub fn most_recent_first(set: &SummarySet) -> Vec<&WorkoutSummary> {
    let mut ordered: Vec<_> = set.values().collect();
    ordered.sort_by(|a, b| b.end.cmp(&a.end).then_with(|| a.id.cmp(&b.id)));
    ordered
}

/// Group summaries by the weekday they started on (week view).
pub fn group_by_weekday(set: &SummarySet) -> BTreeMap<u32, Vec<&WorkoutSummary>> {
    let mut grouped: BTreeMap<u32, Vec<&WorkoutSummary>> = BTreeMap::new();

    for summary in set.values() {
        grouped
            .entry(summary.start.weekday().num_days_from_monday())
            .or_default()
            .push(summary);
    }

    for day in grouped.values_mut() {
        day.sort_by_key(|s| s.start);
    }

    grouped
}

/// Weekday name for a `num_days_from_monday` index.
pub fn weekday_name(index: u32) -> &'static str {
    const NAMES: [&str; 7] = [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ];
    NAMES[(index % 7) as usize]
}

/// Summaries missing at least one metric, by id.
pub fn incomplete_summaries(set: &SummarySet) -> Vec<&WorkoutSummary> {
    set.values()
        .filter(|s| !s.unpopulated_metrics().is_empty())
        .collect()
}

/// The `n` summaries with the largest value for `kind`.
pub fn top_by_metric(set: &SummarySet, kind: MetricKind, n: usize) -> Vec<&WorkoutSummary> {
    let mut sorted: Vec<_> = set.values().filter(|s| s.metric(kind) > 0.0).collect();
    sorted.sort_by(|a, b| {
        b.metric(kind)
            .partial_cmp(&a.metric(kind))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(n);
    sorted
}
