//! File-backed snapshot of the report collection.
//!
//! The whole id-to-record mapping is serialized as one pretty-printed JSON
//! object and rewritten wholesale on every mutation. Writes land in a
//! temporary sibling file first and are renamed into place, so a reader of
//! the snapshot path never observes a half-written collection. Loads retry
//! decode failures a bounded number of times before giving up.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use super::StoreError;
use crate::report::RunRecord;

/// Decode attempts before a load is considered permanently failed.
const LOAD_ATTEMPTS: u32 = 3;

/// Pause between attempts, long enough for an external writer mid-rewrite
/// to finish.
const LOAD_BACKOFF: Duration = Duration::from_millis(250);

/// Handle to the snapshot file of a report collection.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the collection, or an empty one when the file does not exist
    /// yet. A file that repeatedly fails to decode yields
    /// [`StoreError::Unavailable`] rather than silently starting over with
    /// an empty collection.
    pub async fn load(&self) -> Result<BTreeMap<Uuid, RunRecord>, StoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %self.path.display(), "no snapshot yet, starting empty");
                    return Ok(BTreeMap::new());
                }
                Err(e) => {
                    return Err(StoreError::Unavailable(format!(
                        "failed to read snapshot {}: {e}",
                        self.path.display()
                    )));
                }
            };

            match serde_json::from_slice(&bytes) {
                Ok(records) => return Ok(records),
                Err(e) if attempt < LOAD_ATTEMPTS => {
                    warn!(
                        path = %self.path.display(),
                        attempt,
                        error = %e,
                        "snapshot decode failed, retrying"
                    );
                    tokio::time::sleep(LOAD_BACKOFF).await;
                }
                Err(e) => {
                    return Err(StoreError::Unavailable(format!(
                        "snapshot {} failed to decode after {attempt} attempts: {e}",
                        self.path.display()
                    )));
                }
            }
        }
    }

    /// Rewrite the snapshot with the full collection. The temporary file is
    /// created next to the target so the final rename stays on one
    /// filesystem.
    pub async fn write(&self, records: &BTreeMap<Uuid, RunRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records).map_err(|e| {
            StoreError::Unavailable(format!("failed to encode snapshot: {e}"))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(|e| {
            StoreError::Unavailable(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            StoreError::Unavailable(format!(
                "failed to move snapshot into place at {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunRecord;
    use chrono::Utc;
    use serde_json::Map;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("reports.json"));

        let records = snapshot.load().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = SnapshotFile::new(dir.path().join("reports.json"));

        let mut records = BTreeMap::new();
        let record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        records.insert(record.id, record);

        snapshot.write(&records).await.unwrap();
        let loaded = snapshot.load().await.unwrap();
        assert_eq!(loaded, records);

        // The temporary file must not survive the rename.
        assert!(!dir.path().join("reports.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_gives_up_after_bounded_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports.json");
        std::fs::write(&path, b"{ this is not json").unwrap();

        let snapshot = SnapshotFile::new(&path);
        let err = snapshot.load().await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
