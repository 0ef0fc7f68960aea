//! Brain run HTTP Control API (spec §4.I, §6): list brains, start/kill
//! runs, deliver signals, and stream run events/progress over SSE.

use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use serde_json::Value;

use sa_domain::signal::Signal;
use sa_domain::state_machine::is_signal_valid;

use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /brains
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_brains(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "brains": state.manifest.list() }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /brains/:id/history?limit=N
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

pub async fn brain_history(
    State(state): State<AppState>,
    Path(brain_title): Path<String>,
    Query(params): Query<HistoryParams>,
) -> impl IntoResponse {
    let runs = state.monitor.history(&brain_title, params.limit);
    Json(serde_json::json!({ "runs": runs }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /brains/runs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    #[serde(alias = "brainTitle")]
    pub brain_title: Option<String>,
    pub identifier: Option<String>,
    #[serde(default)]
    pub options: Value,
}

pub async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> impl IntoResponse {
    let title = match req.brain_title.or(req.identifier) {
        Some(t) => t,
        None => return api_error(StatusCode::BAD_REQUEST, "brainTitle or identifier is required"),
    };
    let Some(brain) = state.manifest.resolve(&title) else {
        return api_error(StatusCode::NOT_FOUND, format!("unknown brain: {title}"));
    };

    let run_id = format!("run_{}", uuid::Uuid::new_v4());
    let runner = state.runner.clone();
    let options = req.options;
    let run_id_spawned = run_id.clone();
    tokio::spawn(async move {
        if let Err(e) = runner.start(&run_id_spawned, &brain, options, Value::Null).await {
            tracing::error!(run_id = %run_id_spawned, error = %e, "brain run failed");
        }
    });

    (StatusCode::CREATED, Json(serde_json::json!({ "brainRunId": run_id }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /brains/runs/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn kill_run(State(state): State<AppState>, Path(run_id): Path<String>) -> impl IntoResponse {
    let Some(run) = state.monitor.get(&run_id) else {
        return api_error(StatusCode::NOT_FOUND, "run not found");
    };
    if !is_signal_valid(run.status, &Signal::Kill) {
        return api_error(StatusCode::CONFLICT, format!("run is {:?}, cannot be killed", run.status));
    }
    state.signals.enqueue(&run_id, Signal::Kill);
    StatusCode::NO_CONTENT.into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /brains/runs/:id/signals
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn send_signal(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Json(signal): Json<Signal>,
) -> impl IntoResponse {
    let Some(run) = state.monitor.get(&run_id) else {
        return api_error(StatusCode::NOT_FOUND, "run not found");
    };
    if !is_signal_valid(run.status, &signal) {
        return api_error(
            StatusCode::CONFLICT,
            format!("{} not admissible from {:?}", signal.type_name(), run.status),
        );
    }
    state.signals.enqueue(&run_id, signal);
    StatusCode::ACCEPTED.into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /brains/:id/events?since=seq
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    pub since: Option<u64>,
}

pub async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(params): Query<EventsParams>,
) -> impl IntoResponse {
    if state.monitor.get(&run_id).is_none() {
        return api_error(StatusCode::NOT_FOUND, "run not found");
    }
    Json(serde_json::json!({ "events": state.monitor.events(&run_id, params.since) })).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /brains/watch (SSE)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn watch_running(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let mut rx = state.monitor.watch_running();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    if let Ok(json) = serde_json::to_string(&snapshot) {
                        yield Ok(SseEvent::default().event("running").data(json));
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    };
    Sse::new(stream)
}
