//! Schedule CRUD + run listing (spec §3, §4.H, §6).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::Utc;
use serde::Deserialize;

use crate::runtime::schedules::{MissedPolicy, Schedule};
use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /schedules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_schedules(State(state): State<AppState>) -> impl IntoResponse {
    let views: Vec<_> = state.schedule_store.list().await.iter().map(Schedule::to_view).collect();
    Json(serde_json::json!({ "schedules": views }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /schedules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct CreateScheduleRequest {
    #[serde(alias = "brainTitle")]
    pub brain_title: String,
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub missed_policy: MissedPolicy,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_max_catchup_runs")]
    pub max_catchup_runs: usize,
}

fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_concurrency() -> u32 {
    1
}
fn default_max_catchup_runs() -> usize {
    5
}

pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> impl IntoResponse {
    if state.manifest.resolve(&req.brain_title).is_none() {
        return api_error(StatusCode::NOT_FOUND, format!("unknown brain: {}", req.brain_title));
    }
    if let Err(e) = crate::runtime::schedules::validate_cron(&req.cron) {
        return api_error(StatusCode::BAD_REQUEST, format!("invalid cron expression: {e}"));
    }

    let now = Utc::now();
    let schedule = Schedule {
        id: format!("sched_{}", uuid::Uuid::new_v4()),
        brain_title: req.brain_title,
        cron: req.cron,
        timezone: req.timezone,
        enabled: req.enabled,
        created_at: now,
        updated_at: now,
        next_run_at: None,
        last_run_at: None,
        missed_policy: req.missed_policy,
        max_concurrency: req.max_concurrency,
        max_catchup_runs: req.max_catchup_runs,
        last_error: None,
        consecutive_failures: 0,
    };
    let created = state.schedule_store.insert(schedule).await;
    (StatusCode::CREATED, Json(serde_json::json!({ "schedule": created.to_view() }))).into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// DELETE /schedules/:id
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    if state.schedule_store.delete(&id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        api_error(StatusCode::NOT_FOUND, "schedule not found")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /schedules/runs?scheduleId=&status=&limit=
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ListRunsParams {
    #[serde(rename = "scheduleId")]
    pub schedule_id: Option<String>,
    pub status: Option<String>,
    #[serde(default = "default_runs_limit")]
    pub limit: usize,
}

fn default_runs_limit() -> usize {
    50
}

pub async fn list_runs(
    State(state): State<AppState>,
    Query(params): Query<ListRunsParams>,
) -> impl IntoResponse {
    let mut runs = state
        .schedule_store
        .list_runs(params.schedule_id.as_deref(), params.limit)
        .await;
    if let Some(status) = &params.status {
        runs.retain(|r| format!("{:?}", r.status).eq_ignore_ascii_case(status));
    }
    Json(serde_json::json!({ "runs": runs }))
}
