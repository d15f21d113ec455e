//! provreport -- lifecycle tracking and aggregate statistics for
//! asynchronous provisioning test runs.
//!
//! Runs register at start, attach progress updates while in flight, and
//! record a final result at stop; the read path serves individual run
//! state, filtered listings, and a computed fleet summary.

pub mod api;
pub mod config;
pub mod loadgen;
pub mod query;
pub mod report;
pub mod store;
pub mod summary;
pub mod tracker;

use anyhow::{Context, Result};

use crate::config::ServiceConfig;
use crate::store::ReportStore;
use crate::tracker::RunTracker;

/// Start the provreport service: load (or create) the report snapshot,
/// build the tracker, and serve the API until the process exits.
pub async fn serve(config: ServiceConfig) -> Result<()> {
    let store = match &config.store.snapshot_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening report store");
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            ReportStore::open(path).await?
        }
        None => {
            tracing::info!("report store is in-memory only");
            ReportStore::in_memory()
        }
    };

    let tracker = RunTracker::new(store, config.store.on_existing_run);
    let app = api::router(api::AppState::new(tracker));

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    tracing::info!(%addr, "provreport listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
