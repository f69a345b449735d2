//! Durable snapshot of a summary set.
//!
//! The snapshot is a JSON document holding the summaries keyed by workout id
//! together with the source and query that produced them. Writes go to a
//! temporary file in the target directory which is then renamed over the
//! snapshot, so readers never see a partially written file.

use crate::error::{CompanionError, Result};
use crate::models::{SummarySet, WorkoutQuery};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name used inside the application data directory.
pub const SNAPSHOT_FILE_NAME: &str = "summaries.json";

/// What a snapshot was aggregated from. A snapshot only serves loads that
/// ask for the same origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotOrigin {
    /// Identifies the workout source, e.g. the export path.
    pub source: String,
    pub query: WorkoutQuery,
}

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    origin: &'a SnapshotOrigin,
    summaries: &'a SummarySet,
}

#[derive(Deserialize)]
struct SnapshotFile {
    origin: SnapshotOrigin,
    summaries: SummarySet,
}

/// Handle to the on-disk summary snapshot.
#[derive(Debug, Clone)]
pub struct DurableSnapshot {
    path: PathBuf,
}

impl DurableSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot in the platform data directory (`<data_dir>/workout-companion/`).
    ///
    /// Falls back to the working directory when the platform has none.
    pub fn in_data_dir() -> Self {
        let dir = dirs::data_dir()
            .map(|d| d.join(env!("CARGO_PKG_NAME")))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join(SNAPSHOT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[cfg(test)]
    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Serialize `set` and atomically replace the snapshot file.
    ///
    /// JSON has no representation for NaN or infinity, so a set holding one
    /// is rejected and the existing file is left alone.
    pub async fn save(&self, origin: &SnapshotOrigin, set: &SummarySet) -> Result<()> {
        for summary in set.values() {
            if let Some(field) = summary.non_finite_field() {
                return Err(CompanionError::NonFiniteSummary {
                    id: summary.id.clone(),
                    field,
                });
            }
        }

        let bytes = serde_json::to_vec_pretty(&SnapshotFileRef {
            origin,
            summaries: set,
        })?;
        let path = self.path.clone();

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        tokio::fs::create_dir_all(&dir).await?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| CompanionError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| CompanionError::Io(std::io::Error::other(e)))??;

        debug!("Saved {} summaries to {}", set.len(), self.path.display());
        Ok(())
    }

    /// Read the snapshot back, provided it was saved for `origin`.
    ///
    /// A missing file is `StorageAbsent`; anything unreadable or malformed is
    /// `StorageCorrupt`; a snapshot of another source or query is
    /// `StorageMismatch`.
    pub async fn load(&self, origin: &SnapshotOrigin) -> Result<SummarySet> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CompanionError::StorageAbsent(self.path.clone()));
            }
            Err(e) => return Err(CompanionError::corrupt(&self.path, e.to_string())),
        };

        let file: SnapshotFile = serde_json::from_slice(&bytes)
            .map_err(|e| CompanionError::corrupt(&self.path, e.to_string()))?;

        if file.origin != *origin {
            debug!(
                "Snapshot origin {:?} does not match requested {:?}",
                file.origin, origin
            );
            return Err(CompanionError::StorageMismatch(self.path.clone()));
        }

        debug!(
            "Loaded {} summaries from {}",
            file.summaries.len(),
            self.path.display()
        );
        Ok(file.summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{KindFilter, WorkoutSummary};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn origin() -> SnapshotOrigin {
        SnapshotOrigin {
            source: "health/export.json".to_string(),
            query: WorkoutQuery::all_running(),
        }
    }

    fn sample_set() -> SummarySet {
        let start = Utc.with_ymd_and_hms(2024, 3, 2, 7, 15, 30).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let mut set = SummarySet::new();
        set.insert(
            "A1B2".to_string(),
            WorkoutSummary {
                id: "A1B2".to_string(),
                start,
                end: start + chrono::Duration::seconds(2712),
                duration_seconds: 2712.345,
                mets: 9.87654321,
                energy_burned: 412.0000001,
                steps: 5123.0,
                distance: 3.1068559611866697,
                active_minutes: 44.2,
            },
        );
        set.insert(
            "C3D4".to_string(),
            WorkoutSummary {
                id: "C3D4".to_string(),
                start,
                end: start,
                ..WorkoutSummary::default()
            },
        );
        set
    }

    #[tokio::test]
    async fn test_round_trip_is_lossless() {
        let dir = TempDir::new().unwrap();
        let snapshot = DurableSnapshot::new(dir.path().join("nested").join(SNAPSHOT_FILE_NAME));
        let set = sample_set();

        assert_ok!(snapshot.save(&origin(), &set).await);
        assert!(snapshot.exists().await);

        let loaded = snapshot.load(&origin()).await.unwrap();
        assert_eq!(loaded, set);
    }

    #[tokio::test]
    async fn test_empty_set_round_trips() {
        let dir = TempDir::new().unwrap();
        let snapshot = DurableSnapshot::new(dir.path().join(SNAPSHOT_FILE_NAME));

        snapshot.save(&origin(), &SummarySet::new()).await.unwrap();
        assert!(snapshot.load(&origin()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let dir = TempDir::new().unwrap();
        let snapshot = DurableSnapshot::new(dir.path().join(SNAPSHOT_FILE_NAME));

        assert!(!snapshot.exists().await);
        let err = snapshot.load(&origin()).await.unwrap_err();
        assert!(matches!(err, CompanionError::StorageAbsent(_)));
    }

    #[tokio::test]
    async fn test_malformed_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SNAPSHOT_FILE_NAME);
        std::fs::write(&path, b"{\"wk\": {\"id\": 5").unwrap();
        let snapshot = DurableSnapshot::new(path);

        let err = assert_err!(snapshot.load(&origin()).await);
        assert!(matches!(err, CompanionError::StorageCorrupt { .. }));
        assert!(err.is_storage_recoverable());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = DurableSnapshot::new(dir.path().join(SNAPSHOT_FILE_NAME));

        snapshot.save(&origin(), &sample_set()).await.unwrap();
        let mut smaller = sample_set();
        smaller.remove("A1B2");
        snapshot.save(&origin(), &smaller).await.unwrap();

        let loaded = snapshot.load(&origin()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("C3D4"));
    }

    #[tokio::test]
    async fn test_other_origin_is_mismatch() {
        let dir = TempDir::new().unwrap();
        let snapshot = DurableSnapshot::new(dir.path().join(SNAPSHOT_FILE_NAME));
        snapshot.save(&origin(), &sample_set()).await.unwrap();

        let walking = SnapshotOrigin {
            query: WorkoutQuery {
                kind: KindFilter::Walking,
                ..WorkoutQuery::all_running()
            },
            ..origin()
        };
        let err = assert_err!(snapshot.load(&walking).await);
        assert!(matches!(err, CompanionError::StorageMismatch(_)));
        assert!(err.is_storage_recoverable());

        let other_export = SnapshotOrigin {
            source: "other/export.json".to_string(),
            ..origin()
        };
        let err = assert_err!(snapshot.load(&other_export).await);
        assert!(matches!(err, CompanionError::StorageMismatch(_)));

        assert_eq!(snapshot.load(&origin()).await.unwrap(), sample_set());
    }

    #[tokio::test]
    async fn test_non_finite_summary_is_rejected() {
        let dir = TempDir::new().unwrap();
        let snapshot = DurableSnapshot::new(dir.path().join(SNAPSHOT_FILE_NAME));
        snapshot.save(&origin(), &sample_set()).await.unwrap();

        let mut set = sample_set();
        if let Some(summary) = set.get_mut("A1B2") {
            summary.energy_burned = f64::INFINITY;
        }

        let err = assert_err!(snapshot.save(&origin(), &set).await);
        assert!(matches!(
            err,
            CompanionError::NonFiniteSummary {
                field: "energy_burned",
                ..
            }
        ));
        // The previous snapshot is untouched and still loads.
        assert_eq!(snapshot.load(&origin()).await.unwrap(), sample_set());
    }
}
