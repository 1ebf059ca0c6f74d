//! Relay log streaming endpoint

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::{Stream, StreamExt};
use havenkit_core::problemdetails::{self, Problem};
use serde::Deserialize;
use tracing::error;
use utoipa::OpenApi;

use crate::follow::LogFollowService;

pub struct LogsState {
    pub follow_service: Arc<LogFollowService>,
    pub relay_container: String,
}

#[derive(Debug, Deserialize)]
pub struct FollowLogsQuery {
    /// Number of historical lines to include before following
    pub tail: Option<u32>,
}

#[derive(OpenApi)]
#[openapi(
    paths(follow_relay_logs),
    info(
        title = "Logs API",
        description = "API endpoint for following the relay container's logs in real time.",
        version = "1.0.0"
    )
)]
pub struct LogsApiDoc;

pub fn configure_routes() -> Router<Arc<LogsState>> {
    Router::new().route("/relay/logs/follow", get(follow_relay_logs))
}

/// Follow the relay container's logs as Server-Sent Events
#[utoipa::path(
    tag = "Logs",
    get,
    path = "/relay/logs/follow",
    params(
        ("tail" = Option<u32>, Query, description = "Number of historical lines to include")
    ),
    responses(
        (status = 200, description = "Server-Sent Events stream of relay log lines", content_type = "text/event-stream"),
        (status = 500, description = "Could not start the log follower")
    )
)]
async fn follow_relay_logs(
    State(state): State<Arc<LogsState>>,
    Query(query): Query<FollowLogsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Problem> {
    let lines = state
        .follow_service
        .follow(&state.relay_container, query.tail)
        .map_err(|e| {
            error!("Failed to follow relay logs: {}", e);
            problemdetails::new(StatusCode::INTERNAL_SERVER_ERROR)
                .with_title("Failed to follow relay logs")
                .with_detail(e.to_string())
        })?;

    let event_stream = lines.map(|line| {
        // SSE field values cannot contain newlines
        let cleaned = line.trim_end_matches(['\n', '\r']);
        Ok::<Event, Infallible>(
            Event::default()
                .json_data(serde_json::json!({ "log": cleaned }))
                .expect("log line serializes"),
        )
    });

    Ok(Sse::new(event_stream).keep_alive(KeepAlive::default()))
}
