//! Markdown and JSON report generation.
//!
//! This module renders a summary set, with its totals and week view, for
//! the command-line consumer.

use crate::analysis::{
    group_by_weekday, incomplete_summaries, most_recent_first, top_by_metric, weekday_name,
    SummaryTotals,
};
use crate::cache::RefreshSource;
use crate::models::{MetricKind, SummarySet, WorkoutSummary};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about how the report's data was obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// When the report was rendered.
    pub generated_at: DateTime<Utc>,
    /// Health export the summaries were aggregated from.
    pub source: String,
    /// Durable snapshot backing the cache.
    pub snapshot_path: String,
    /// True when a full fetch was forced.
    pub forced: bool,
    /// Where the reported summaries came from; unset when no refresh has
    /// completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_from: Option<RefreshSource>,
    /// Wall time of the refresh in seconds.
    pub duration_seconds: f64,
    /// Set when the refresh failed and previous summaries are shown.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
}

/// The complete workout report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub totals: SummaryTotals,
    /// Summaries, most recent first.
    pub workouts: Vec<WorkoutSummary>,
    #[serde(skip)]
    set: SummarySet,
}

impl Report {
    /// Build a report over `set`.
    pub fn new(metadata: ReportMetadata, set: &SummarySet) -> Self {
        Self {
            metadata,
            totals: SummaryTotals::from_summaries(set),
            workouts: most_recent_first(set).into_iter().cloned().collect(),
            set: set.clone(),
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    output.push_str("# Workout Summary\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_totals_section(&report.totals));
    output.push_str(&generate_week_section(&report.set));
    output.push_str(&generate_workouts_section(&report.workouts));
    output.push_str(&generate_highlights_section(&report.set));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** `{}`\n", metadata.source));
    section.push_str(&format!("- **Snapshot:** `{}`\n", metadata.snapshot_path));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let refresh = match (metadata.served_from, metadata.forced) {
        (Some(RefreshSource::Snapshot), _) => "loaded from snapshot",
        (Some(RefreshSource::Fetched), true) => "forced fetch",
        (Some(RefreshSource::Fetched), false) => "fetched (no usable snapshot)",
        (None, _) => "not completed",
    };
    section.push_str(&format!(
        "- **Refresh:** {} in {:.1}s\n",
        refresh, metadata.duration_seconds
    ));
    if let Some(ref error) = metadata.refresh_error {
        section.push_str(&format!(
            "- **Refresh failed:** {} (showing previous summaries)\n",
            error
        ));
    }
    section.push('\n');

    section
}

/// Generate the totals section.
fn generate_totals_section(totals: &SummaryTotals) -> String {
    let mut section = String::new();

    section.push_str("## Totals\n\n");
    section.push_str("| Workouts | Duration | Energy | Distance | Steps | Active | Avg METs |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    let metrics: Vec<String> = MetricKind::ALL
        .into_iter()
        .map(|kind| format_metric(kind, totals.metric(kind)))
        .collect();
    section.push_str(&format!(
        "| {} | {} | {} | {:.1} |\n\n",
        totals.workouts,
        format_duration(totals.duration_seconds),
        metrics.join(" | "),
        totals.average_mets
    ));

    if totals.incomplete > 0 {
        section.push_str(&format!(
            "*{} of {} workouts have metrics that could not be fetched and show as 0.*\n\n",
            totals.incomplete, totals.workouts
        ));
    }

    section
}

/// Generate the per-weekday section.
fn generate_week_section(set: &SummarySet) -> String {
    let grouped = group_by_weekday(set);
    if grouped.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## By Weekday\n\n");
    section.push_str("| Day | Workouts | Distance | Energy |\n");
    section.push_str("|:---|:---:|:---:|:---:|\n");

    for (day, summaries) in &grouped {
        let distance: f64 = summaries.iter().map(|s| s.distance).sum();
        let energy: f64 = summaries.iter().map(|s| s.energy_burned).sum();
        section.push_str(&format!(
            "| {} | {} | {:.2} mi | {:.0} kcal |\n",
            weekday_name(*day),
            summaries.len(),
            distance,
            energy
        ));
    }
    section.push('\n');

    section
}

/// Generate the workouts table.
fn generate_workouts_section(workouts: &[WorkoutSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Workouts\n\n");

    if workouts.is_empty() {
        section.push_str("No workouts found.\n\n");
        return section;
    }

    section.push_str(&format!("{} workouts\n\n", workouts.len()));
    section.push_str("| Workout | Start | Duration | Energy | Distance | Steps | Active | METs |\n");
    section.push_str("|:---|:---|:---:|:---:|:---:|:---:|:---:|:---:|\n");

    for summary in workouts {
        section.push_str(&generate_workout_row(summary));
    }
    section.push('\n');

    section
}

/// Generate a single workout row.
fn generate_workout_row(summary: &WorkoutSummary) -> String {
    let metrics: Vec<String> = MetricKind::ALL
        .into_iter()
        .map(|kind| format_metric(kind, summary.metric(kind)))
        .collect();
    format!(
        "| `{}` | {} | {} | {} | {:.1} |\n",
        summary.id,
        summary.start.format("%Y-%m-%d %H:%M"),
        format_duration(summary.duration_seconds),
        metrics.join(" | "),
        summary.mets
    )
}

/// Generate the longest-distance and incomplete lists.
fn generate_highlights_section(set: &SummarySet) -> String {
    let longest = top_by_metric(set, MetricKind::Distance, 3);
    let incomplete = incomplete_summaries(set);
    if longest.is_empty() && incomplete.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Highlights\n\n");

    if !longest.is_empty() {
        section.push_str("### Longest Distance\n\n");
        for (i, summary) in longest.iter().enumerate() {
            section.push_str(&format!(
                "{}. `{}` {} on {}\n",
                i + 1,
                summary.id,
                format_metric(MetricKind::Distance, summary.distance),
                summary.start.format("%Y-%m-%d")
            ));
        }
        section.push('\n');
    }

    if !incomplete.is_empty() {
        section.push_str("### Incomplete\n\n");
        for summary in incomplete {
            let missing: Vec<String> = summary
                .unpopulated_metrics()
                .iter()
                .map(ToString::to_string)
                .collect();
            section.push_str(&format!("- `{}`: {}\n", summary.id, missing.join(", ")));
        }
        section.push('\n');
    }

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by workout-companion v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Format a metric value with its unit; step counts stay bare.
fn format_metric(kind: MetricKind, value: f64) -> String {
    match kind {
        MetricKind::Distance => format!("{:.2} {}", value, kind.unit()),
        MetricKind::Steps => format!("{:.0}", value),
        _ => format!("{:.0} {}", value, kind.unit()),
    }
}

/// Format seconds as `h:mm:ss` or `m:ss`.
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
