//! HTTP handlers for the import job

pub mod types;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use havenkit_config::RelayListKind;
use havenkit_core::problemdetails::Problem;
use havenkit_core::ProblemDetails;
use utoipa::OpenApi;

use crate::sink::LogEvent;
use crate::state::{JobState, JobStatus};
use types::{
    AppState, ImportCancelResponse, ImportInfoResponse, ImportRunResponse, ImportStatusResponse,
};

/// Idle interval after which the stream emits a keepalive comment
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period before the final status frame, so the browser renders the
/// last log lines first
const FINAL_STATUS_DELAY: Duration = Duration::from_millis(500);

#[derive(OpenApi)]
#[openapi(
    paths(
        run_import,
        cancel_import,
        get_import_status,
        get_import_info,
        stream_import_events
    ),
    components(schemas(
        ImportRunResponse,
        ImportCancelResponse,
        ImportStatusResponse,
        ImportInfoResponse,
        LogEvent,
        crate::sink::LogEventKind,
        JobStatus,
        ProblemDetails
    )),
    info(
        title = "Import API",
        description = "API endpoints for supervising the relay bulk import: start, cancel, \
        poll status, and stream live progress over Server-Sent Events.",
        version = "1.0.0"
    )
)]
pub struct ImportApiDoc;

/// Configure routes for the import API
pub fn configure_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/import/run", post(run_import))
        .route("/import/cancel", post(cancel_import))
        .route("/import/status", get(get_import_status))
        .route("/import/info", get(get_import_info))
        .route("/import/stream", get(stream_import_events))
}

/// Start the import job
#[utoipa::path(
    tag = "Import",
    post,
    path = "/import/run",
    responses(
        (status = 202, description = "Import job accepted", body = ImportRunResponse),
        (status = 409, description = "An import job is already running", body = ProblemDetails)
    )
)]
async fn run_import(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Problem> {
    state.import_service.start_job()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ImportRunResponse {
            message: "Import started".to_string(),
        }),
    ))
}

/// Cancel the running import job
#[utoipa::path(
    tag = "Import",
    post,
    path = "/import/cancel",
    responses(
        (status = 202, description = "Cancellation requested", body = ImportCancelResponse),
        (status = 409, description = "No job running, or cancellation already requested", body = ProblemDetails)
    )
)]
async fn cancel_import(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Problem> {
    state.import_service.request_cancel()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ImportCancelResponse {
            message: "Cancellation requested".to_string(),
        }),
    ))
}

/// Get the current import job status
#[utoipa::path(
    tag = "Import",
    get,
    path = "/import/status",
    responses(
        (status = 200, description = "Current job status", body = ImportStatusResponse)
    )
)]
async fn get_import_status(State(state): State<Arc<AppState>>) -> Json<ImportStatusResponse> {
    let JobState { status, message } = state.import_service.state();
    Json(ImportStatusResponse { status, message })
}

/// Get import configuration information
#[utoipa::path(
    tag = "Import",
    get,
    path = "/import/info",
    responses(
        (status = 200, description = "Import configuration summary", body = ImportInfoResponse),
        (status = 500, description = "Could not read configuration files")
    )
)]
async fn get_import_info(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Problem> {
    let relays = state
        .config_service
        .read_relays(RelayListKind::Import)
        .await?;
    let import_start_date = state
        .config_service
        .import_start_date()
        .await?
        .unwrap_or_else(|| "Not set".to_string());
    let JobState { status, message } = state.import_service.state();

    Ok(Json(ImportInfoResponse {
        relay_count: relays.len(),
        import_start_date,
        status,
        message,
    }))
}

fn status_frame(state: &JobState) -> Event {
    Event::default()
        .json_data(serde_json::json!({ "type": "status", "status": state.status }))
        .expect("status frame serializes")
}

/// Stream import progress as Server-Sent Events
///
/// Emits an initial status frame, then forwards log events as the
/// orchestrator produces them, with a keepalive comment on idle. Once the
/// job reaches a terminal state the stream sends a final status frame and
/// ends; if no job is running and nothing is pending it ends right away.
#[utoipa::path(
    tag = "Import",
    get,
    path = "/import/stream",
    responses(
        (status = 200, description = "Stream of import log events", content_type = "text/event-stream")
    )
)]
async fn stream_import_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let service = state.import_service.clone();

    let stream = async_stream::stream! {
        yield Ok::<Event, Infallible>(status_frame(&service.state()));

        // The sink has a single reader; a second concurrent stream only
        // gets the status snapshot above
        let Some(mut events) = service.sink().take_reader() else {
            return;
        };

        loop {
            match tokio::time::timeout(HEARTBEAT_INTERVAL, events.recv()).await {
                Ok(Some(event)) => {
                    yield Ok(Event::default()
                        .json_data(&event)
                        .expect("log event serializes"));
                    if service.state().status.is_terminal() {
                        tokio::time::sleep(FINAL_STATUS_DELAY).await;
                        yield Ok(status_frame(&service.state()));
                        break;
                    }
                }
                Ok(None) => {
                    // The sink was reset under us; report where the job
                    // ended up and close
                    yield Ok(status_frame(&service.state()));
                    break;
                }
                Err(_) => {
                    yield Ok(Event::default().comment("heartbeat"));
                    if !service.state().status.is_running() {
                        break;
                    }
                }
            }
        }
    };

    Sse::new(stream)
}
