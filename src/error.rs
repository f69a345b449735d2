//! Error types for the aggregation pipeline.

use crate::models::MetricKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the workout pipeline
#[derive(Error, Debug)]
pub enum CompanionError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Failed to fetch {kind} for workout {workout_id}: {message}")]
    MetricFetchFailed {
        kind: MetricKind,
        workout_id: String,
        message: String,
    },

    #[error("No durable snapshot at {}", .0.display())]
    StorageAbsent(PathBuf),

    #[error("Durable snapshot at {} is unreadable: {message}", .path.display())]
    StorageCorrupt { path: PathBuf, message: String },

    #[error("Durable snapshot at {} was built from a different source or query", .0.display())]
    StorageMismatch(PathBuf),

    #[error("Summary for workout {id} has a non-finite {field}")]
    NonFiniteSummary { id: String, field: &'static str },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Refresh cancelled")]
    Cancelled,

    #[error("Refresh failed: {0}")]
    RefreshFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CompanionError>;

impl CompanionError {
    /// Create a provider-unavailable error from a message
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ProviderUnavailable(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a metric fetch error for one workout and kind
    pub fn metric(kind: MetricKind, workout_id: &str, msg: impl Into<String>) -> Self {
        Self::MetricFetchFailed {
            kind,
            workout_id: workout_id.to_string(),
            message: msg.into(),
        }
    }

    /// Create a corrupt-snapshot error
    pub fn corrupt(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::StorageCorrupt {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Snapshot problems the cache recovers from with a full fetch.
    pub fn is_storage_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StorageAbsent(_) | Self::StorageCorrupt { .. } | Self::StorageMismatch(_)
        )
    }
}
