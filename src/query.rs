//! Query filter -- predicate-set filtering over a snapshot of the report
//! collection.
//!
//! Deserializes straight from the request query string. Every supplied
//! predicate must pass (logical AND); an empty predicate set passes
//! everything. String predicates are case-sensitive prefix matches.

use std::collections::BTreeMap;

use serde::Deserialize;
use uuid::Uuid;

use crate::report::RunRecord;

/// Optional predicates over run records.
///
/// `failed` and `success` are not mutually exclusive: supplying both asks
/// for records that are simultaneously failed and successful, which no
/// record satisfies. That is the caller's prerogative.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportQuery {
    /// Prefix match on the test category, e.g. `1nic`.
    #[serde(rename = "type")]
    pub test_type: Option<String>,
    /// Prefix match on the image name.
    pub image: Option<String>,
    /// Prefix match on the zone.
    pub zone: Option<String>,
    /// Keep only records whose results lack `status == "SUCCESS"`.
    pub failed: bool,
    /// Keep only records whose results carry `status == "SUCCESS"`.
    pub success: bool,
}

impl ReportQuery {
    /// Does `record` pass every supplied predicate?
    ///
    /// A record missing a queried classification field does not match that
    /// predicate.
    pub fn matches(&self, record: &RunRecord) -> bool {
        if let Some(prefix) = &self.test_type {
            if !record.test_type().is_some_and(|t| t.starts_with(prefix)) {
                return false;
            }
        }
        if let Some(prefix) = &self.image {
            if !record.image_name().is_some_and(|i| i.starts_with(prefix)) {
                return false;
            }
        }
        if let Some(prefix) = &self.zone {
            if !record.zone().is_some_and(|z| z.starts_with(prefix)) {
                return false;
            }
        }
        if self.failed && record.marked_success() {
            return false;
        }
        if self.success && !record.marked_success() {
            return false;
        }
        true
    }
}

/// Records of `snapshot` passing every predicate of `query`, in id order.
pub fn filter(snapshot: &BTreeMap<Uuid, RunRecord>, query: &ReportQuery) -> Vec<RunRecord> {
    snapshot
        .values()
        .filter(|record| query.matches(record))
        .cloned()
        .collect()
}
