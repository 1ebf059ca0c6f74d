//! Relay status and restart endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use havenkit_core::problemdetails::{self, Problem};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};

use crate::runtime::{ContainerRuntime, RuntimeError};

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);
const RESTART_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RuntimeState {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub relay_container: String,
}

/// Current relay container status
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RelayStatusResponse {
    /// The container state as reported by the runtime (e.g. "running")
    pub status: String,
    pub running: bool,
}

/// Response for a successful relay restart
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RelayRestartResponse {
    pub message: String,
}

impl From<RuntimeError> for Problem {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::Timeout { .. } => problemdetails::new(StatusCode::GATEWAY_TIMEOUT)
                .with_title("Container Runtime Timeout")
                .with_detail(error.to_string()),
            _ => problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Container Runtime Error")
                .with_detail(error.to_string()),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(get_relay_status, restart_relay),
    components(schemas(RelayStatusResponse, RelayRestartResponse)),
    info(
        title = "Relay API",
        description = "API endpoints for querying and restarting the relay container.",
        version = "1.0.0"
    )
)]
pub struct RuntimeApiDoc;

pub fn configure_routes() -> Router<Arc<RuntimeState>> {
    Router::new()
        .route("/status", get(get_relay_status))
        .route("/restart", post(restart_relay))
}

/// Get the relay container status
#[utoipa::path(
    tag = "Relay",
    get,
    path = "/status",
    responses(
        (status = 200, description = "Relay container status", body = RelayStatusResponse),
        (status = 500, description = "Could not query the container runtime"),
        (status = 504, description = "Container runtime timed out")
    )
)]
async fn get_relay_status(
    State(state): State<Arc<RuntimeState>>,
) -> Result<impl IntoResponse, Problem> {
    let status = state
        .runtime
        .inspect_format(
            &state.relay_container,
            "{{.State.Status}}",
            STATUS_TIMEOUT,
        )
        .await
        .map_err(|e| {
            error!("Failed to inspect relay container: {}", e);
            Problem::from(e)
        })?;

    let running = status == "running";
    Ok(Json(RelayStatusResponse { status, running }))
}

/// Restart the relay container
#[utoipa::path(
    tag = "Relay",
    post,
    path = "/restart",
    responses(
        (status = 200, description = "Relay restarted", body = RelayRestartResponse),
        (status = 500, description = "Restart command failed"),
        (status = 504, description = "Restart command timed out")
    )
)]
async fn restart_relay(
    State(state): State<Arc<RuntimeState>>,
) -> Result<impl IntoResponse, Problem> {
    info!("Restarting relay container {}", state.relay_container);

    state
        .runtime
        .restart(&state.relay_container, RESTART_TIMEOUT)
        .await
        .map_err(|e| {
            error!("Failed to restart relay container: {}", e);
            Problem::from(e)
        })?;

    Ok(Json(RelayRestartResponse {
        message: "Relay restarted successfully".to_string(),
    }))
}
