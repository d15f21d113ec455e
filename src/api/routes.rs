//! API route definitions.
//!
//! The mutating routes (`/start`, `/stop`, `PUT /report/{id}`) take the run
//! id from the path and a JSON object body; reads serve deep snapshots of
//! the collection. Non-UUID id segments are rejected by extraction before a
//! handler runs.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::query::ReportQuery;
use crate::report::RunRecord;
use crate::summary::Summary;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/start/{id}", post(start_run))
        .route("/stop/{id}", post(stop_run))
        .route("/report", get(list_reports))
        .route("/report", delete(clear_reports))
        .route("/report/{id}", get(get_report))
        .route("/report/{id}", put(update_report))
        .route("/report/{id}", delete(delete_report))
        .route("/running", get(running_reports))
        .route("/failed", get(failed_reports))
        .route("/query", get(query_reports))
        .route("/summary", get(summary))
        .route("/health", get(health))
}

async fn start_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<StatusCode, ApiError> {
    state.tracker.start(id, fields).await?;
    Ok(StatusCode::OK)
}

async fn stop_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(results): Json<Map<String, Value>>,
) -> Result<StatusCode, ApiError> {
    state.tracker.stop(id, results).await?;
    Ok(StatusCode::OK)
}

async fn list_reports(State(state): State<AppState>) -> Json<BTreeMap<Uuid, RunRecord>> {
    Json(state.tracker.list_all().await)
}

async fn clear_reports(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.tracker.clear().await?;
    Ok(StatusCode::OK)
}

async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunRecord>, ApiError> {
    Ok(Json(state.tracker.get(id).await?))
}

async fn update_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(fields): Json<Map<String, Value>>,
) -> Result<Json<RunRecord>, ApiError> {
    Ok(Json(state.tracker.update(id, fields).await?))
}

async fn delete_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.tracker.delete(id).await?;
    Ok(StatusCode::OK)
}

async fn running_reports(State(state): State<AppState>) -> Json<Vec<RunRecord>> {
    Json(state.tracker.list_running().await)
}

async fn failed_reports(State(state): State<AppState>) -> Json<Vec<RunRecord>> {
    Json(state.tracker.list_failed().await)
}

async fn query_reports(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Json<Vec<RunRecord>> {
    Json(state.tracker.query(&query).await)
}

async fn summary(State(state): State<AppState>) -> Json<Summary> {
    Json(state.tracker.summary().await)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
