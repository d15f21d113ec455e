//! HTTP error mapping for API handlers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::store::StoreError;

/// Store failures translated to HTTP responses.
///
/// Callers only learn two things beyond success: the run does not exist, or
/// the service could not complete the request and a retry may help. Anything
/// internal stays in the logs.
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "no such run"),
            StoreError::Conflict(_) => (StatusCode::CONFLICT, "run already registered"),
            StoreError::Unavailable(reason) => {
                error!(%reason, "store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "service unavailable, retry")
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
