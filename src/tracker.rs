//! Run lifecycle manager -- start, update, stop, delete semantics over the
//! report store, plus the read-side entry points the API serves from.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::query::{self, ReportQuery};
use crate::report::RunRecord;
use crate::store::{ReportStore, StoreError};
use crate::summary::{self, Summary};

/// What to do when a start arrives for an id that is already registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Refuse the new start and keep the existing record.
    #[default]
    Reject,
    /// Replace the existing record with the fresh one.
    Overwrite,
}

/// Drives run records through their lifecycle.
pub struct RunTracker {
    store: ReportStore,
    start_policy: StartPolicy,
}

impl RunTracker {
    pub fn new(store: ReportStore, start_policy: StartPolicy) -> Self {
        Self {
            store,
            start_policy,
        }
    }

    /// Register a new running record under `id`. A duplicate id is refused
    /// or overwritten per the configured policy.
    pub async fn start(&self, id: Uuid, fields: Map<String, Value>) -> Result<(), StoreError> {
        let record = RunRecord::begin(id, fields, Utc::now());
        match self.start_policy {
            StartPolicy::Reject => self.store.insert_new(record).await?,
            StartPolicy::Overwrite => self.store.put(record).await?,
        }
        info!(run = %id, "run started");
        Ok(())
    }

    /// Merge caller-supplied fields into an existing record and return the
    /// updated copy.
    pub async fn update(
        &self,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<RunRecord, StoreError> {
        let updated = self.store.mutate(id, |record| record.merge(fields)).await?;
        debug!(run = %id, "run updated");
        Ok(updated)
    }

    /// Move a record to its terminal state with the final results payload.
    pub async fn stop(&self, id: Uuid, results: Map<String, Value>) -> Result<(), StoreError> {
        let now = Utc::now();
        let record = self
            .store
            .mutate(id, |record| record.finish(results, now))
            .await?;
        info!(
            run = %id,
            duration = record.duration,
            success = record.is_success(),
            "run stopped"
        );
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<RunRecord, StoreError> {
        self.store.get(id).await.ok_or(StoreError::NotFound(id))
    }

    /// Remove one record. Deleting an unknown id succeeds without effect.
    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        if self.store.delete(id).await? {
            info!(run = %id, "run deleted");
        }
        Ok(())
    }

    /// Remove every record.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.clear().await?;
        info!("all runs cleared");
        Ok(())
    }

    pub async fn list_all(&self) -> BTreeMap<Uuid, RunRecord> {
        self.store.list().await
    }

    pub async fn list_running(&self) -> Vec<RunRecord> {
        self.store
            .list()
            .await
            .into_values()
            .filter(RunRecord::is_running)
            .collect()
    }

    pub async fn list_failed(&self) -> Vec<RunRecord> {
        self.store
            .list()
            .await
            .into_values()
            .filter(RunRecord::is_failed)
            .collect()
    }

    /// Records passing every predicate of `query`, in id order.
    pub async fn query(&self, query: &ReportQuery) -> Vec<RunRecord> {
        query::filter(&self.store.list().await, query)
    }

    /// Aggregate statistics over a consistent snapshot of the collection.
    pub async fn summary(&self) -> Summary {
        summary::summarize(&self.store.list().await, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn tracker(policy: StartPolicy) -> RunTracker {
        RunTracker::new(ReportStore::in_memory(), policy)
    }

    #[tokio::test]
    async fn test_start_creates_running_record() {
        let tracker = tracker(StartPolicy::Reject);
        let id = Uuid::new_v4();

        tracker
            .start(id, fields(json!({"zone": "us-south-3"})))
            .await
            .unwrap();

        let record = tracker.get(id).await.unwrap();
        assert!(record.is_running());
        assert!(record.results.is_empty());
        assert_eq!(record.zone(), Some("us-south-3"));
    }

    #[tokio::test]
    async fn test_start_duplicate_rejected_keeps_original() {
        let tracker = tracker(StartPolicy::Reject);
        let id = Uuid::new_v4();

        tracker
            .start(id, fields(json!({"zone": "us-south-3"})))
            .await
            .unwrap();
        let err = tracker
            .start(id, fields(json!({"zone": "eu-de-1"})))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(tracker.get(id).await.unwrap().zone(), Some("us-south-3"));
    }

    #[tokio::test]
    async fn test_start_duplicate_overwrite_replaces() {
        let tracker = tracker(StartPolicy::Overwrite);
        let id = Uuid::new_v4();

        tracker
            .start(id, fields(json!({"zone": "us-south-3"})))
            .await
            .unwrap();
        tracker
            .start(id, fields(json!({"zone": "eu-de-1"})))
            .await
            .unwrap();

        assert_eq!(tracker.get(id).await.unwrap().zone(), Some("eu-de-1"));
        assert_eq!(tracker.list_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_then_restop_is_allowed() {
        let tracker = tracker(StartPolicy::Reject);
        let id = Uuid::new_v4();
        tracker.start(id, Map::new()).await.unwrap();

        tracker
            .stop(id, fields(json!({"status": "SUCCESS"})))
            .await
            .unwrap();
        assert!(tracker.get(id).await.unwrap().is_success());

        // A second stop replaces the results wholesale.
        tracker
            .stop(id, fields(json!({"test timedout": true})))
            .await
            .unwrap();
        let record = tracker.get(id).await.unwrap();
        assert!(record.is_failed());
        assert!(record.timed_out());
    }

    #[tokio::test]
    async fn test_lifecycle_calls_on_unknown_id_are_not_found() {
        let tracker = tracker(StartPolicy::Reject);
        let id = Uuid::new_v4();

        assert!(matches!(
            tracker.get(id).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            tracker.update(id, Map::new()).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            tracker.stop(id, Map::new()).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_unknown_id_is_silent() {
        let tracker = tracker(StartPolicy::Reject);
        tracker.start(Uuid::new_v4(), Map::new()).await.unwrap();

        tracker.delete(Uuid::new_v4()).await.unwrap();
        assert_eq!(tracker.list_all().await.len(), 1);
    }

    #[tokio::test]
    async fn test_running_and_failed_listings_partition_terminal_states() {
        let tracker = tracker(StartPolicy::Reject);
        let running = Uuid::new_v4();
        let succeeded = Uuid::new_v4();
        let failed = Uuid::new_v4();

        tracker.start(running, Map::new()).await.unwrap();
        tracker.start(succeeded, Map::new()).await.unwrap();
        tracker.start(failed, Map::new()).await.unwrap();
        tracker
            .stop(succeeded, fields(json!({"status": "SUCCESS"})))
            .await
            .unwrap();
        tracker.stop(failed, Map::new()).await.unwrap();

        let running_ids: Vec<Uuid> = tracker.list_running().await.iter().map(|r| r.id).collect();
        assert_eq!(running_ids, vec![running]);

        let failed_ids: Vec<Uuid> = tracker.list_failed().await.iter().map(|r| r.id).collect();
        assert_eq!(failed_ids, vec![failed]);
    }

    #[tokio::test]
    async fn test_clear_removes_everything() {
        let tracker = tracker(StartPolicy::Reject);
        tracker.start(Uuid::new_v4(), Map::new()).await.unwrap();
        tracker.start(Uuid::new_v4(), Map::new()).await.unwrap();

        tracker.clear().await.unwrap();
        assert!(tracker.list_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_across_calls() {
        let tracker = tracker(StartPolicy::Reject);
        let id = Uuid::new_v4();
        tracker.start(id, Map::new()).await.unwrap();

        tracker
            .update(id, fields(json!({"terraform_plan_result_code": 0})))
            .await
            .unwrap();
        let updated = tracker
            .update(id, fields(json!({"terraform_apply_result_code": 0})))
            .await
            .unwrap();

        assert_eq!(updated.num_field("terraform_plan_result_code"), Some(0.0));
        assert_eq!(updated.num_field("terraform_apply_result_code"), Some(0.0));
    }
}
