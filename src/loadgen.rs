//! Workload driver -- scripted provisioning runs against a live server.
//!
//! Drives the full lifecycle end to end over HTTP: start a run per
//! scenario, report terraform progress, stop with a success payload, then
//! clean up. Useful both as a smoke test of a deployment and as a light
//! load generator when pointed at a shared instance.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::report::{epoch_seconds, READABLE_TIME_FORMAT};

/// One provisioning scenario: classification plus the results payload its
/// stop reports.
struct Scenario {
    test_type: &'static str,
    zone: &'static str,
    image_name: &'static str,
    hostname: &'static str,
}

const SCENARIOS: [Scenario; 3] = [
    Scenario {
        test_type: "1nic",
        zone: "us-south-3",
        image_name: "base-14-1",
        hostname: "onenic-test.local",
    },
    Scenario {
        test_type: "2nic",
        zone: "eu-de-1",
        image_name: "base-14-1",
        hostname: "twonic-test.local",
    },
    Scenario {
        test_type: "3nic",
        zone: "eu-gb-2",
        image_name: "base-14-1",
        hostname: "threenic-test.local",
    },
];

/// Options for one loadgen pass.
#[derive(Debug, Clone)]
pub struct LoadgenOptions {
    /// Server to drive, e.g. `http://localhost:5000`.
    pub base_url: String,
    /// Pause between lifecycle steps.
    pub pace: Duration,
    /// Leave the records on the server instead of deleting them at the end.
    pub keep: bool,
}

/// Run every scenario through start, progress update, and stop, then print
/// the resulting summary. Fails on the first unexpected HTTP status.
pub async fn run(options: LoadgenOptions) -> Result<()> {
    let client = Client::new();
    let base = options.base_url.trim_end_matches('/');
    let mut runs: Vec<(Uuid, &Scenario)> = Vec::new();

    for scenario in &SCENARIOS {
        let id = Uuid::new_v4();
        info!(run = %id, test_type = scenario.test_type, zone = scenario.zone, "starting run");
        let response = client
            .post(format!("{base}/start/{id}"))
            .json(&json!({
                "type": scenario.test_type,
                "zone": scenario.zone,
                "image_name": scenario.image_name,
            }))
            .send()
            .await
            .with_context(|| format!("start request for {id} failed"))?;
        expect_status(response.status(), StatusCode::OK, "start", id)?;
        runs.push((id, scenario));
        pause(options.pace).await;
    }

    let now = Utc::now();
    let progress = json!({
        "terraform_result_code": 0,
        "terraform_output": "It worked!",
        "terraform_apply_stop": epoch_seconds(now),
        "terraform_apply_result_code": 0,
        "terraform_apply_duration": options.pace.as_secs_f64(),
        "terraform_completed_at": epoch_seconds(now),
        "terraform_completed_at_readable": now.format(READABLE_TIME_FORMAT).to_string(),
    });
    for (id, _) in &runs {
        let response = client
            .put(format!("{base}/report/{id}"))
            .json(&progress)
            .send()
            .await
            .with_context(|| format!("update request for {id} failed"))?;
        expect_status(response.status(), StatusCode::OK, "update", *id)?;
        pause(options.pace).await;
    }

    for (id, scenario) in &runs {
        let response = client
            .post(format!("{base}/stop/{id}"))
            .json(&json!({
                "status": "SUCCESS",
                "hostname": scenario.hostname,
                "product": "provtest",
                "version": "14.1",
            }))
            .send()
            .await
            .with_context(|| format!("stop request for {id} failed"))?;
        expect_status(response.status(), StatusCode::OK, "stop", *id)?;
        pause(options.pace).await;
    }

    let summary: Value = client
        .get(format!("{base}/summary"))
        .send()
        .await
        .context("summary request failed")?
        .json()
        .await
        .context("summary response was not JSON")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !options.keep {
        for (id, _) in &runs {
            let response = client
                .delete(format!("{base}/report/{id}"))
                .send()
                .await
                .with_context(|| format!("delete request for {id} failed"))?;
            expect_status(response.status(), StatusCode::OK, "delete", *id)?;
        }
        info!(count = runs.len(), "cleaned up loadgen runs");
    }

    Ok(())
}

fn expect_status(got: StatusCode, want: StatusCode, step: &str, id: Uuid) -> Result<()> {
    if got != want {
        bail!("{step} for run {id} returned {got}, expected {want}");
    }
    Ok(())
}

/// Sleep for `pace` plus a little jitter so concurrent loadgen instances do
/// not march in lockstep.
async fn pause(pace: Duration) {
    let jitter = rand::thread_rng().gen_range(0..=pace.as_millis().min(250) as u64);
    tokio::time::sleep(pace + Duration::from_millis(jitter)).await;
}
