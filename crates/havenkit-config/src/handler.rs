use crate::service::{ConfigService, ConfigServiceError, RelayListKind};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use havenkit_core::error_builder;
use havenkit_core::problemdetails::Problem;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

pub struct ConfigState {
    pub config_service: Arc<ConfigService>,
}

/// Raw contents of the relay `.env` file
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EnvFileResponse {
    pub content: String,
}

/// Request body for saving the relay `.env` file
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveEnvRequest {
    pub content: String,
}

/// A relay list (blastr or import)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RelayListResponse {
    pub relays: Vec<String>,
}

/// Request body for saving a relay list
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveRelaysRequest {
    pub relays: Vec<String>,
}

/// Response for a successful configuration update
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfigUpdateResponse {
    pub message: String,
}

impl From<ConfigServiceError> for Problem {
    fn from(error: ConfigServiceError) -> Self {
        match error {
            ConfigServiceError::InvalidRelayKind(kind) => error_builder::bad_request()
                .title("Invalid Relay List")
                .detail(format!("Unknown relay list kind: {}", kind))
                .build(),
            ConfigServiceError::InvalidJson { file, details } => error_builder::bad_request()
                .title("Invalid JSON")
                .detail(format!("{}: {}", file, details))
                .build(),
            ConfigServiceError::Io(e) => error_builder::internal_server_error()
                .title("Configuration Error")
                .detail(e.to_string())
                .build(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(get_env_config, save_env_config, get_relay_config, save_relay_config),
    components(schemas(
        EnvFileResponse,
        SaveEnvRequest,
        RelayListResponse,
        SaveRelaysRequest,
        ConfigUpdateResponse
    )),
    info(
        title = "Configuration API",
        description = "API endpoints for editing the relay's configuration files: \
        the .env environment file and the blastr/import relay lists.",
        version = "1.0.0"
    )
)]
pub struct ConfigApiDoc;

pub fn configure_routes() -> Router<Arc<ConfigState>> {
    Router::new()
        .route("/config/env", get(get_env_config))
        .route("/config/env", put(save_env_config))
        .route("/config/relays/{kind}", get(get_relay_config))
        .route("/config/relays/{kind}", put(save_relay_config))
}

/// Get the relay `.env` configuration
#[utoipa::path(
    tag = "Configuration",
    get,
    path = "/config/env",
    responses(
        (status = 200, description = "Current .env contents", body = EnvFileResponse),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_env_config(
    State(state): State<Arc<ConfigState>>,
) -> Result<impl IntoResponse, Problem> {
    let content = state.config_service.read_env().await?;
    Ok(Json(EnvFileResponse { content }))
}

/// Save the relay `.env` configuration
#[utoipa::path(
    tag = "Configuration",
    put,
    path = "/config/env",
    request_body = SaveEnvRequest,
    responses(
        (status = 200, description = "Environment configuration saved", body = ConfigUpdateResponse),
        (status = 500, description = "Internal server error")
    )
)]
async fn save_env_config(
    State(state): State<Arc<ConfigState>>,
    Json(request): Json<SaveEnvRequest>,
) -> Result<impl IntoResponse, Problem> {
    state.config_service.write_env(&request.content).await?;
    Ok(Json(ConfigUpdateResponse {
        message: "Environment configuration saved successfully".to_string(),
    }))
}

/// Get a relay list (blastr or import)
#[utoipa::path(
    tag = "Configuration",
    get,
    path = "/config/relays/{kind}",
    params(
        ("kind" = String, Path, description = "Relay list kind: blastr or import")
    ),
    responses(
        (status = 200, description = "Relay list", body = RelayListResponse),
        (status = 400, description = "Unknown relay list kind or invalid JSON on disk"),
        (status = 500, description = "Internal server error")
    )
)]
async fn get_relay_config(
    State(state): State<Arc<ConfigState>>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, Problem> {
    let kind = RelayListKind::parse(&kind)?;
    let relays = state.config_service.read_relays(kind).await?;
    Ok(Json(RelayListResponse { relays }))
}

/// Save a relay list (blastr or import)
#[utoipa::path(
    tag = "Configuration",
    put,
    path = "/config/relays/{kind}",
    params(
        ("kind" = String, Path, description = "Relay list kind: blastr or import")
    ),
    request_body = SaveRelaysRequest,
    responses(
        (status = 200, description = "Relay list saved", body = ConfigUpdateResponse),
        (status = 400, description = "Unknown relay list kind"),
        (status = 500, description = "Internal server error")
    )
)]
async fn save_relay_config(
    State(state): State<Arc<ConfigState>>,
    Path(kind): Path<String>,
    Json(request): Json<SaveRelaysRequest>,
) -> Result<impl IntoResponse, Problem> {
    let kind = RelayListKind::parse(&kind)?;
    state
        .config_service
        .write_relays(kind, &request.relays)
        .await?;
    Ok(Json(ConfigUpdateResponse {
        message: format!("Relay {} configuration saved successfully", kind.as_str()),
    }))
}
