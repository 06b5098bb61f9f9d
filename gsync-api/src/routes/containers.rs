use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::debug;

use gsync_orchestrator::{ContainerObservation, ContainerStats};

use crate::{error::ApiResult, state::AppState};

/// Default tail for the log viewer.
const DEFAULT_LOG_LINES: usize = 500;
const MAX_LOG_LINES: usize = 10_000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/containers", get(list_containers))
        .route("/api/stats", get(stats))
        .route("/api/containers/{id}/logs", get(logs))
        .route("/api/containers/{id}/logs/stream", get(stream_logs))
        .route("/api/containers/{id}/start", post(start_container))
        .route("/api/containers/{id}/stop", post(stop_container))
        .route("/api/containers/{id}/restart", post(restart_container))
}

async fn list_containers(State(state): State<AppState>) -> ApiResult<Json<Vec<ContainerObservation>>> {
    let observed = state.run(|o| o.list_running()).await?;
    Ok(Json(observed))
}

async fn stats(State(state): State<AppState>) -> ApiResult<Json<ContainerStats>> {
    Ok(Json(state.run(|o| o.container_stats()).await?))
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub lines: Option<usize>,
}

async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<Value>> {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES).clamp(1, MAX_LOG_LINES);
    let logs = state.run(move |o| o.container_logs(&id, lines)).await?;
    Ok(Json(json!({ "logs": logs })))
}

/// One SSE `data:` event per log line. The follow stops when the client goes away.
async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<String>(256);
    let orchestrator = state.orchestrator.clone();

    tokio::task::spawn_blocking(move || {
        let result = orchestrator.follow_container_logs(&id, &mut |line: &str| {
            tx.blocking_send(line.to_string()).is_ok()
        });
        if let Err(e) = result {
            debug!(container = %id, error = %e, "log stream ended with error");
            let _ = tx.blocking_send(format!("Error: {e}"));
        }
    });

    let events = stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|line| (Ok(Event::default().data(line)), rx))
    });
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn start_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.run(move |o| o.start_container(&id)).await?;
    Ok(Json(json!({ "status": "started" })))
}

async fn stop_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.run(move |o| o.stop_container(&id)).await?;
    Ok(Json(json!({ "status": "stopped" })))
}

async fn restart_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.run(move |o| o.restart_container(&id)).await?;
    Ok(Json(json!({ "status": "restarted" })))
}
