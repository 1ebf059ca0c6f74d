//! Wire types for the import API

use std::sync::Arc;

use havenkit_config::ConfigService;
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::ImportJobService;
use crate::state::JobStatus;

pub struct AppState {
    pub import_service: Arc<ImportJobService>,
    pub config_service: Arc<ConfigService>,
}

/// Response for an accepted import start request
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportRunResponse {
    pub message: String,
}

/// Response for an accepted cancellation request
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportCancelResponse {
    pub message: String,
}

/// Current import job state
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportStatusResponse {
    pub status: JobStatus,
    pub message: String,
}

/// Import configuration summary shown before starting a job
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportInfoResponse {
    /// Number of relays configured in the import relay list
    pub relay_count: usize,
    /// Configured IMPORT_START_DATE, or "Not set"
    pub import_start_date: String,
    pub status: JobStatus,
    pub message: String,
}
