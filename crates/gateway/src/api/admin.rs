//! Health and system-info endpoints — ambient operational surface, not
//! part of the Brain run API proper (spec §6: "health probe").

use axum::extract::State;
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

/// `GET /v1/health` — liveness probe. Public, no auth.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `GET /v1/admin/info` — brain/schedule counts, useful for `doctor`
/// and dashboards alike.
pub async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    let brains = state.manifest.list();
    let schedules = state.schedule_store.list().await;
    Json(serde_json::json!({
        "brains_registered": brains.len(),
        "schedules": schedules.len(),
        "api_auth_enabled": state.api_token_hash.is_some(),
        "manifest_dir": state.config.brains.manifest_dir,
    }))
}
