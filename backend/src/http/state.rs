//! Application state for the HTTP server.

use std::sync::Arc;

use crate::analytics::AnalyticsTableUpdateService;
use crate::db::SqlEngine;
use crate::integrity::DataIntegrityService;
use crate::services::JobTracker;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn SqlEngine>,
    pub update_service: Arc<AnalyticsTableUpdateService>,
    pub integrity: Arc<DataIntegrityService>,
    pub job_tracker: JobTracker,
}

impl AppState {
    pub fn new(
        engine: Arc<dyn SqlEngine>,
        update_service: Arc<AnalyticsTableUpdateService>,
        integrity: Arc<DataIntegrityService>,
    ) -> Self {
        Self {
            engine,
            update_service,
            integrity,
            job_tracker: JobTracker::new(),
        }
    }
}
