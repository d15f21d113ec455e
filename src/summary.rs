//! Aggregation engine -- fleet-wide statistics over a snapshot of the
//! report collection.
//!
//! `summarize` is a pure function of the snapshot and the supplied "now":
//! the same inputs always yield the same summary. Every record is
//! classified into exactly one bucket (running, success, failed), duration
//! statistics are kept per terminal bucket, phase telemetry is tallied from
//! the paired `<phase>_result_code` / `<phase>_duration` fields, and the
//! zone / test type / image dimensions each get their own counter rows.
//!
//! A record missing a classification field is excluded from that dimension
//! only; it still counts in the global totals and is surfaced through
//! `unclassified_tests` so thinning data is visible rather than silent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::report::{epoch_seconds, RunRecord};

/// Provisioning phases whose `<phase>_result_code` / `<phase>_duration`
/// field pairs are aggregated when present. Code 0 is completed, code 1 is
/// failed, anything else is ignored.
pub const PHASES: [&str; 4] = [
    "workspace_create",
    "terraform_plan",
    "terraform_apply",
    "terraform_destroy",
];

/// Round to two decimal places, the precision everything in the summary is
/// reported at.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Output shapes
// ---------------------------------------------------------------------------

/// Duration statistics for one terminal bucket. All-zero when the bucket is
/// empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationStats {
    pub count: u64,
    pub total_seconds: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Completion telemetry for one provisioning phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub completed: u64,
    pub completed_avg: f64,
    pub failed: u64,
}

/// Counter row for one value of a classification dimension (a zone, a test
/// type, or an image name).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionStats {
    pub running: u64,
    pub success: u64,
    pub failed: u64,
    pub terraform_failed: u64,
    /// Failure rate over terminal records only; running runs are not in the
    /// denominator. Zero when nothing terminal has been seen.
    pub percent_failure: f64,
}

/// Fleet-wide aggregate over the report collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_tests: u64,
    /// One formatted line per in-flight run: id, elapsed seconds, test
    /// type, zone.
    pub running_tests: Vec<String>,
    pub success_tests: u64,
    pub success_duration: DurationStats,
    pub failed_tests: u64,
    pub failed_duration: DurationStats,
    /// Failed runs whose `terraform_result_code` is positive.
    pub failed_in_terraform: u64,
    /// Failed runs carrying the executor's timeout marker.
    pub failed_by_timeout: u64,
    /// Runs whose terraform stage completed (`terraform_result_code == 0`
    /// with an apply-stop timestamp to measure from).
    pub terraform_completed: u64,
    /// Average seconds from run start to terraform apply stop, over the
    /// completed set.
    pub terraform_completed_avg: f64,
    /// Records missing at least one of zone, test type, or image name.
    pub unclassified_tests: u64,
    pub phases: BTreeMap<String, PhaseStats>,
    pub zones: BTreeMap<String, DimensionStats>,
    pub test_types: BTreeMap<String, DimensionStats>,
    pub image_names: BTreeMap<String, DimensionStats>,
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Running duration accumulator. Min and max are seeded from the first
/// sample, so a legitimate positive minimum is never shadowed by a zero
/// seed.
#[derive(Debug, Default)]
struct DurationAcc {
    count: u64,
    total: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl DurationAcc {
    fn observe(&mut self, seconds: f64) {
        self.count += 1;
        self.total += seconds;
        self.min = Some(self.min.map_or(seconds, |m| m.min(seconds)));
        self.max = Some(self.max.map_or(seconds, |m| m.max(seconds)));
    }

    fn finish(&self) -> DurationStats {
        let average = if self.count > 0 {
            self.total / self.count as f64
        } else {
            0.0
        };
        DurationStats {
            count: self.count,
            total_seconds: round2(self.total),
            average: round2(average),
            min: round2(self.min.unwrap_or(0.0)),
            max: round2(self.max.unwrap_or(0.0)),
        }
    }
}

#[derive(Debug, Default)]
struct PhaseAcc {
    completed: u64,
    completed_seconds: f64,
    failed: u64,
}

impl PhaseAcc {
    fn finish(&self) -> PhaseStats {
        let completed_avg = if self.completed > 0 {
            round2(self.completed_seconds / self.completed as f64)
        } else {
            0.0
        };
        PhaseStats {
            completed: self.completed,
            completed_avg,
            failed: self.failed,
        }
    }
}

fn bump(
    dimension: &mut BTreeMap<String, DimensionStats>,
    key: Option<&str>,
    apply: impl Fn(&mut DimensionStats),
) {
    if let Some(key) = key {
        apply(dimension.entry(key.to_string()).or_default());
    }
}

// ---------------------------------------------------------------------------
// summarize
// ---------------------------------------------------------------------------

/// Compute the fleet-wide summary of `records` as of `now`.
pub fn summarize(records: &BTreeMap<Uuid, RunRecord>, now: DateTime<Utc>) -> Summary {
    let now_secs = epoch_seconds(now);

    let mut summary = Summary {
        total_tests: records.len() as u64,
        ..Summary::default()
    };
    let mut success_acc = DurationAcc::default();
    let mut failed_acc = DurationAcc::default();
    let mut phase_accs: [PhaseAcc; PHASES.len()] = Default::default();
    let mut terraform_seconds = 0.0;

    for (id, record) in records {
        let zone = record.zone();
        let test_type = record.test_type();
        let image = record.image_name();
        if zone.is_none() || test_type.is_none() || image.is_none() {
            summary.unclassified_tests += 1;
        }

        // Phase telemetry is independent of the lifecycle bucket: a run can
        // report completed phases and still be in flight, or fail later.
        for (phase, acc) in PHASES.iter().zip(phase_accs.iter_mut()) {
            match record.num_field(&format!("{phase}_result_code")) {
                Some(code) if code == 0.0 => {
                    acc.completed += 1;
                    if let Some(seconds) = record.num_field(&format!("{phase}_duration")) {
                        acc.completed_seconds += seconds;
                    }
                }
                Some(code) if code == 1.0 => acc.failed += 1,
                _ => {}
            }
        }
        if record.num_field("terraform_result_code") == Some(0.0) {
            if let Some(apply_stop) = record.num_field("terraform_apply_stop") {
                summary.terraform_completed += 1;
                terraform_seconds += apply_stop - record.start_time;
            }
        }

        if record.is_running() {
            let elapsed = (now_secs - record.start_time).max(0.0) as i64;
            summary.running_tests.push(format!(
                "{id} - {elapsed} seconds - {} - {}",
                test_type.unwrap_or("unknown"),
                zone.unwrap_or("unknown"),
            ));
            bump(&mut summary.zones, zone, |d| d.running += 1);
            bump(&mut summary.test_types, test_type, |d| d.running += 1);
            bump(&mut summary.image_names, image, |d| d.running += 1);
        } else if record.is_success() {
            summary.success_tests += 1;
            success_acc.observe(record.duration);
            bump(&mut summary.zones, zone, |d| d.success += 1);
            bump(&mut summary.test_types, test_type, |d| d.success += 1);
            bump(&mut summary.image_names, image, |d| d.success += 1);
        } else {
            summary.failed_tests += 1;
            failed_acc.observe(record.duration);
            if record
                .num_field("terraform_result_code")
                .is_some_and(|code| code > 0.0)
            {
                summary.failed_in_terraform += 1;
                bump(&mut summary.zones, zone, |d| d.terraform_failed += 1);
                bump(&mut summary.test_types, test_type, |d| d.terraform_failed += 1);
                bump(&mut summary.image_names, image, |d| d.terraform_failed += 1);
            }
            if record.timed_out() {
                summary.failed_by_timeout += 1;
            }
            bump(&mut summary.zones, zone, |d| d.failed += 1);
            bump(&mut summary.test_types, test_type, |d| d.failed += 1);
            bump(&mut summary.image_names, image, |d| d.failed += 1);
        }
    }

    summary.success_duration = success_acc.finish();
    summary.failed_duration = failed_acc.finish();
    if summary.terraform_completed > 0 {
        summary.terraform_completed_avg =
            round2(terraform_seconds / summary.terraform_completed as f64);
    }
    summary.phases = PHASES
        .iter()
        .zip(phase_accs.iter())
        .map(|(phase, acc)| (phase.to_string(), acc.finish()))
        .collect();
    for dimension in [
        &mut summary.zones,
        &mut summary.test_types,
        &mut summary.image_names,
    ] {
        for stats in dimension.values_mut() {
            let terminal = stats.success + stats.failed;
            if terminal > 0 {
                stats.percent_failure = round2(stats.failed as f64 / terminal as f64 * 100.0);
            }
        }
    }

    summary
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
