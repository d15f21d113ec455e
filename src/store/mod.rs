//! Concurrent report store -- the single shared collection of run records.
//!
//! One `tokio::sync::RwLock` guards the whole id-to-record mapping: readers
//! share, writers are exclusive, and every mutating call holds the write
//! guard across its read-modify-write and the snapshot rewrite. At most one
//! mutation is in flight at a time, and a mutation is durably reflected
//! before the guard is released, so no caller ever observes a partially
//! applied change.
//!
//! Granularity is deliberately the entire collection, matching the
//! wholesale snapshot rewrite. Writes to unrelated runs serialize behind
//! each other, which is fine at the tens of concurrent runs this service
//! sees.

pub mod snapshot;

use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use self::snapshot::SnapshotFile;
use crate::report::RunRecord;

/// Failures surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no run with id {0}")]
    NotFound(Uuid),
    #[error("run {0} is already registered")]
    Conflict(Uuid),
    #[error("report store unavailable: {0}")]
    Unavailable(String),
}

/// The shared collection of run records, optionally mirrored to a snapshot
/// file.
#[derive(Debug)]
pub struct ReportStore {
    records: RwLock<BTreeMap<Uuid, RunRecord>>,
    snapshot: Option<SnapshotFile>,
}

impl ReportStore {
    /// Purely in-memory store, no durable snapshot.
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            snapshot: None,
        }
    }

    /// Store mirrored to a snapshot file, seeded with whatever the file
    /// already holds.
    pub async fn open(path: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let snapshot = SnapshotFile::new(path);
        let records = snapshot.load().await?;
        if !records.is_empty() {
            info!(
                count = records.len(),
                path = %snapshot.path().display(),
                "loaded report snapshot"
            );
        }
        Ok(Self {
            records: RwLock::new(records),
            snapshot: Some(snapshot),
        })
    }

    /// Copy of one record.
    pub async fn get(&self, id: Uuid) -> Option<RunRecord> {
        self.records.read().await.get(&id).cloned()
    }

    /// Copy of the full collection, ordered by id.
    pub async fn list(&self) -> BTreeMap<Uuid, RunRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Insert or replace a whole record.
    pub async fn put(&self, record: RunRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.insert(record.id, record);
        self.persist(&records).await
    }

    /// Insert a record only if its id is not yet registered.
    pub async fn insert_new(&self, record: RunRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        records.insert(record.id, record);
        self.persist(&records).await
    }

    /// Apply `f` to an existing record under the write guard and return the
    /// updated copy. This is the read-modify-write path: two concurrent
    /// mutations of the same record cannot lose each other's writes.
    pub async fn mutate(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut RunRecord),
    ) -> Result<RunRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        f(record);
        let updated = record.clone();
        self.persist(&records).await?;
        Ok(updated)
    }

    /// Remove one record. Returns whether it existed; removing an unknown
    /// id leaves the store untouched.
    pub async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        if records.remove(&id).is_none() {
            return Ok(false);
        }
        self.persist(&records).await?;
        Ok(true)
    }

    /// Drop every record.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.clear();
        self.persist(&records).await
    }

    /// Mirror the in-memory state to the snapshot file, if one is
    /// configured. A failed rewrite leaves the previous snapshot intact on
    /// disk; memory stays ahead until the next successful rewrite catches
    /// it up.
    async fn persist(&self, records: &BTreeMap<Uuid, RunRecord>) -> Result<(), StoreError> {
        match &self.snapshot {
            Some(snapshot) => snapshot.write(records).await,
            None => Ok(()),
        }
    }
}
