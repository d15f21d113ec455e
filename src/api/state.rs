//! Shared state passed to API handlers.

use std::sync::Arc;

use crate::tracker::RunTracker;

#[derive(Clone)]
pub struct AppState {
    pub tracker: Arc<RunTracker>,
}

impl AppState {
    pub fn new(tracker: RunTracker) -> Self {
        Self {
            tracker: Arc::new(tracker),
        }
    }
}
