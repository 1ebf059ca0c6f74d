//! Import job services

mod orchestrator;

pub use orchestrator::{
    default_completion_matcher, CompletionMatcher, ImportJobService, ImportSettings,
    ImportTunables, COMPLETION_MARKERS, DEFAULT_IMPORT_IMAGE, DEFAULT_IMPORT_NETWORK,
};

use havenkit_config::ConfigServiceError;
use havenkit_core::error_builder;
use havenkit_core::problemdetails::Problem;
use havenkit_runtime::RuntimeError;
use thiserror::Error;

/// Rejections for job control requests (start/cancel)
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImportControlError {
    #[error("An import job is already running")]
    AlreadyRunning,

    #[error("No import job is running")]
    NotRunning,

    #[error("Cancellation has already been requested")]
    AlreadyCancelling,
}

impl From<ImportControlError> for Problem {
    fn from(error: ImportControlError) -> Self {
        let title = match error {
            ImportControlError::AlreadyRunning => "Import Already Running",
            ImportControlError::NotRunning => "No Import Running",
            ImportControlError::AlreadyCancelling => "Cancellation Already Requested",
        };
        error_builder::conflict()
            .title(title)
            .detail(error.to_string())
            .build()
    }
}

/// In-flight job failures, folded into the terminal `failed` status message
#[derive(Error, Debug)]
pub enum ImportJobError {
    #[error("Failed to stop relay: {0}")]
    RelayStop(#[source] RuntimeError),

    #[error("Failed to start import container: {0}")]
    SpawnImport(#[source] RuntimeError),

    #[error("Failed to read environment file: {0}")]
    EnvFile(#[source] ConfigServiceError),

    #[error("Import command failed with code {0}")]
    ImportExit(i32),

    #[error("Import process timed out")]
    ImportTimeout,

    #[error("Container runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn control_errors_map_to_conflict_problems() {
        for error in [
            ImportControlError::AlreadyRunning,
            ImportControlError::NotRunning,
            ImportControlError::AlreadyCancelling,
        ] {
            let problem = Problem::from(error);
            assert_eq!(problem.status_code, StatusCode::CONFLICT);
            assert!(problem.body.contains_key("title"));
            assert!(problem.body.contains_key("detail"));
        }
    }

    #[test]
    fn exit_code_is_part_of_the_failure_message() {
        assert_eq!(
            ImportJobError::ImportExit(137).to_string(),
            "Import command failed with code 137"
        );
    }
}
