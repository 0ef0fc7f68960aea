pub mod admin;
pub mod auth;
pub mod brains;
pub mod schedules;
pub mod webhooks;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full HTTP Control API router (spec §4.I, §6).
///
/// Webhooks are public (external services can't carry our bearer
/// token; CSRF is enforced per-delivery by the Webhook Router itself).
/// Everything else sits behind `auth::require_api_token`.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(admin::health))
        .route("/webhooks/system/ui-form", post(webhooks::deliver_ui_form))
        .route("/webhooks/:slug", post(webhooks::deliver));

    let protected = Router::new()
        .route("/v1/admin/info", get(admin::system_info))
        .route("/brains", get(brains::list_brains))
        .route("/brains/watch", get(brains::watch_running))
        .route("/brains/:id/history", get(brains::brain_history))
        .route("/brains/:id/events", get(brains::run_events))
        .route("/brains/runs", post(brains::start_run))
        .route("/brains/runs/:id", delete(brains::kill_run))
        .route("/brains/runs/:id/signals", post(brains::send_signal))
        .route("/schedules", get(schedules::list_schedules))
        .route("/schedules", post(schedules::create_schedule))
        .route("/schedules/:id", delete(schedules::delete_schedule))
        .route("/schedules/runs", get(schedules::list_runs))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
