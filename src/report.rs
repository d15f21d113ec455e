//! Run record model -- the unit of state tracked per provisioning test run.
//!
//! A record couples a fixed set of lifecycle fields (timestamps, duration,
//! final results) with a free-form bag of caller-supplied fields:
//! classification strings like `zone`, phase telemetry like
//! `terraform_apply_result_code`. The bag is serde-flattened so the wire
//! shape stays one flat JSON object, the same shape the provisioning
//! executors have always reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Format for the human-readable companions of the epoch-seconds fields.
pub const READABLE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Results key the executors write when a run was killed for exceeding its
/// time budget.
pub const TIMEOUT_MARKER: &str = "test timedout";

/// Results key whose value `"SUCCESS"` marks a terminal run as successful.
pub const STATUS_KEY: &str = "status";

const STATUS_SUCCESS: &str = "SUCCESS";

/// Smallest duration a terminal record may carry. Keeps a stopped run
/// distinguishable from a running one (`duration == 0`) when start and stop
/// land in the same microsecond.
const MIN_TERMINAL_DURATION: f64 = 1e-6;

/// Wall-clock instant as fractional seconds since the Unix epoch.
pub fn epoch_seconds(t: DateTime<Utc>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}

// ---------------------------------------------------------------------------
// RunRecord
// ---------------------------------------------------------------------------

/// One provisioning test run, keyed in the store by `id`.
///
/// `duration == 0` means the run is still in flight; a terminal record has
/// `duration > 0` and its final payload in `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Caller-assigned run identifier (also the store key).
    pub id: Uuid,
    /// Start instant, fractional seconds since the Unix epoch.
    pub start_time: f64,
    pub readable_start_time: String,
    #[serde(default)]
    pub stop_time: Option<f64>,
    #[serde(default)]
    pub readable_stop_time: Option<String>,
    /// Seconds between start and stop; `0` while the run is in flight.
    #[serde(default)]
    pub duration: f64,
    /// Final outcome payload, empty until the run is stopped.
    #[serde(default)]
    pub results: Map<String, Value>,
    /// Caller-supplied classification and phase fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RunRecord {
    /// Create a record in the running state at `now`.
    ///
    /// The caller's initial payload lands in the field bag; keys that would
    /// collide with a lifecycle field are discarded, the server owns those.
    pub fn begin(id: Uuid, initial_fields: Map<String, Value>, now: DateTime<Utc>) -> Self {
        let mut record = RunRecord {
            id,
            start_time: epoch_seconds(now),
            readable_start_time: now.format(READABLE_TIME_FORMAT).to_string(),
            stop_time: None,
            readable_stop_time: None,
            duration: 0.0,
            results: Map::new(),
            fields: Map::new(),
        };
        for (key, value) in initial_fields {
            if !is_lifecycle_key(&key) {
                record.fields.insert(key, value);
            }
        }
        record
    }

    /// Transition to the terminal state: record the stop instant and the
    /// final results payload verbatim.
    ///
    /// Re-stopping an already-terminal record is allowed and simply re-stops
    /// it; the duration is recomputed from the original start.
    pub fn finish(&mut self, results: Map<String, Value>, now: DateTime<Utc>) {
        let stop = epoch_seconds(now);
        self.stop_time = Some(stop);
        self.readable_stop_time = Some(now.format(READABLE_TIME_FORMAT).to_string());
        self.duration = (stop - self.start_time).max(MIN_TERMINAL_DURATION);
        self.results = results;
    }

    /// Shallow per-key merge, last write wins.
    ///
    /// Free-form keys land in the bag. Lifecycle keys are applied to the
    /// typed fields only when the value has the right shape; a wrong-typed
    /// value (say a string `duration`) is dropped rather than corrupting the
    /// running/terminal discriminator. `id` is immutable.
    pub fn merge(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            match key.as_str() {
                "id" => {}
                "start_time" => {
                    if let Some(v) = value.as_f64() {
                        self.start_time = v;
                    }
                }
                "readable_start_time" => {
                    if let Some(v) = value.as_str() {
                        self.readable_start_time = v.to_string();
                    }
                }
                "stop_time" => match value {
                    Value::Null => self.stop_time = None,
                    v => {
                        if let Some(v) = v.as_f64() {
                            self.stop_time = Some(v);
                        }
                    }
                },
                "readable_stop_time" => match value {
                    Value::Null => self.readable_stop_time = None,
                    v => {
                        if let Some(v) = v.as_str() {
                            self.readable_stop_time = Some(v.to_string());
                        }
                    }
                },
                "duration" => {
                    if let Some(v) = value.as_f64() {
                        self.duration = v;
                    }
                }
                "results" => {
                    if let Value::Object(map) = value {
                        self.results = map;
                    }
                }
                _ => {
                    self.fields.insert(key, value);
                }
            }
        }
    }

    /// Still in flight?
    pub fn is_running(&self) -> bool {
        self.duration == 0.0
    }

    /// Terminal with `results.status == "SUCCESS"`.
    pub fn is_success(&self) -> bool {
        !self.is_running()
            && self.results.get(STATUS_KEY).and_then(Value::as_str) == Some(STATUS_SUCCESS)
    }

    /// Terminal without a SUCCESS status.
    pub fn is_failed(&self) -> bool {
        !self.is_running() && !self.is_success()
    }

    /// Whether `results` carries a SUCCESS status, regardless of lifecycle
    /// state. Running records never do (their results are empty).
    pub fn marked_success(&self) -> bool {
        self.results.get(STATUS_KEY).and_then(Value::as_str) == Some(STATUS_SUCCESS)
    }

    /// Whether the executor flagged this run as killed by its time budget.
    pub fn timed_out(&self) -> bool {
        self.results.contains_key(TIMEOUT_MARKER)
    }

    pub fn zone(&self) -> Option<&str> {
        self.str_field("zone")
    }

    /// Test category, e.g. `1nic`. Stored under the bag key `type`.
    pub fn test_type(&self) -> Option<&str> {
        self.str_field("type")
    }

    pub fn image_name(&self) -> Option<&str> {
        self.str_field("image_name")
    }

    /// String-valued bag field, if present and actually a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Numeric bag field, if present and actually a number.
    pub fn num_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }
}

fn is_lifecycle_key(key: &str) -> bool {
    matches!(
        key,
        "id" | "start_time"
            | "readable_start_time"
            | "stop_time"
            | "readable_stop_time"
            | "duration"
            | "results"
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

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

    #[test]
    fn test_begin_is_running_with_empty_results() {
        let id = Uuid::new_v4();
        let record = RunRecord::begin(
            id,
            fields(json!({"zone": "us-south-3", "type": "1nic", "image_name": "base-14-1"})),
            Utc::now(),
        );

        assert_eq!(record.id, id);
        assert!(record.is_running());
        assert!(!record.is_success());
        assert!(!record.is_failed());
        assert!(record.results.is_empty());
        assert_eq!(record.stop_time, None);
        assert_eq!(record.zone(), Some("us-south-3"));
        assert_eq!(record.test_type(), Some("1nic"));
        assert_eq!(record.image_name(), Some("base-14-1"));
    }

    #[test]
    fn test_begin_discards_lifecycle_keys_from_payload() {
        let record = RunRecord::begin(
            Uuid::new_v4(),
            fields(json!({"zone": "eu-de-1", "duration": 99.0, "results": {"status": "SUCCESS"}})),
            Utc::now(),
        );

        // The server owns the lifecycle fields at creation.
        assert!(record.is_running());
        assert!(record.results.is_empty());
        assert!(!record.fields.contains_key("duration"));
        assert!(!record.fields.contains_key("results"));
    }

    #[test]
    fn test_finish_transitions_to_terminal() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        record.finish(fields(json!({"status": "SUCCESS"})), Utc::now());

        assert!(!record.is_running());
        assert!(record.is_success());
        assert!(record.duration > 0.0);
        assert!(record.stop_time.is_some());
        assert!(record.readable_stop_time.is_some());
    }

    #[test]
    fn test_finish_without_status_is_failed() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        record.finish(Map::new(), Utc::now());

        assert!(record.is_failed());
        assert!(!record.is_success());
    }

    #[test]
    fn test_finish_same_instant_still_terminal() {
        let now = Utc::now();
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), now);
        record.finish(Map::new(), now);

        assert!(!record.is_running());
        assert!(record.duration > 0.0);
    }

    #[test]
    fn test_refinish_recomputes_from_original_start() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        record.finish(fields(json!({"status": "SUCCESS"})), Utc::now());
        let first_duration = record.duration;

        record.finish(Map::new(), Utc::now());
        assert!(record.duration >= first_duration);
        assert!(record.is_failed());
    }

    #[test]
    fn test_merge_puts_free_form_keys_in_bag() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        record.merge(fields(json!({"terraform_plan_result_code": 0, "terraform_plan_duration": 12.5})));
        record.merge(fields(json!({"terraform_plan_result_code": 1})));

        // Last write wins per key.
        assert_eq!(record.num_field("terraform_plan_result_code"), Some(1.0));
        assert_eq!(record.num_field("terraform_plan_duration"), Some(12.5));
    }

    #[test]
    fn test_merge_rejects_wrong_typed_lifecycle_values() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        let original_id = record.id;
        let original_start = record.start_time;

        record.merge(fields(json!({
            "id": Uuid::new_v4().to_string(),
            "duration": "not a number",
            "results": "not an object"
        })));

        assert_eq!(record.id, original_id);
        assert_eq!(record.start_time, original_start);
        assert!(record.is_running());
        assert!(record.results.is_empty());
        // None of the rejected keys may leak into the bag either.
        assert!(!record.fields.contains_key("duration"));
        assert!(!record.fields.contains_key("results"));
        assert!(!record.fields.contains_key("id"));
    }

    #[test]
    fn test_merge_accepts_well_typed_lifecycle_values() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        record.merge(fields(json!({"duration": 42.5, "results": {"status": "SUCCESS"}})));

        assert_eq!(record.duration, 42.5);
        assert!(record.is_success());
    }

    #[test]
    fn test_timed_out_marker() {
        let mut record = RunRecord::begin(Uuid::new_v4(), Map::new(), Utc::now());
        record.finish(fields(json!({"test timedout": true})), Utc::now());

        assert!(record.timed_out());
        assert!(record.is_failed());
    }

    #[test]
    fn test_wire_shape_is_flat() {
        let mut record = RunRecord::begin(
            Uuid::new_v4(),
            fields(json!({"zone": "us-south-3"})),
            Utc::now(),
        );
        record.merge(fields(json!({"workspace_create_result_code": 0})));

        let wire = serde_json::to_value(&record).unwrap();
        // Bag keys sit beside the lifecycle fields, not under a nested map.
        assert_eq!(wire["zone"], "us-south-3");
        assert_eq!(wire["workspace_create_result_code"], 0);
        assert_eq!(wire["duration"], 0.0);
        assert!(wire.get("fields").is_none());

        let back: RunRecord = serde_json::from_value(wire).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_non_string_classification_is_ignored() {
        let record = RunRecord::begin(
            Uuid::new_v4(),
            fields(json!({"zone": 17, "type": "1nic"})),
            Utc::now(),
        );

        assert_eq!(record.zone(), None);
        assert_eq!(record.test_type(), Some("1nic"));
    }
}
