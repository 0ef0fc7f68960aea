//! Webhook delivery endpoints (spec §4.G, §6) — the axum-facing adapter
//! over `runtime::webhooks::WebhookRouter::deliver`.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::Value;

use crate::runtime::webhooks::{parse_ui_form, DeliveryOutcome};
use crate::state::AppState;

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn submitted_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    headers
        .get("x-webhook-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_token.map(str::to_string))
}

#[derive(Debug, Deserialize)]
pub struct WebhookParams {
    pub identifier: Option<String>,
    pub token: Option<String>,
    /// Challenge-response verification (Slack/Stripe URL handshake).
    pub challenge: Option<Value>,
}

fn outcome_response(outcome: DeliveryOutcome) -> Response {
    match outcome {
        DeliveryOutcome::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "received": true, "action": "not_found" })),
        )
            .into_response(),
        DeliveryOutcome::Ignored { reason } => (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({ "received": false, "action": "ignored", "reason": reason })),
        )
            .into_response(),
        DeliveryOutcome::IgnoredStale => (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "action": "ignored", "reason": "run is no longer waiting" })),
        )
            .into_response(),
        DeliveryOutcome::Resumed { run_id } => (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "action": "resumed", "brainRunId": run_id })),
        )
            .into_response(),
    }
}

/// `POST /webhooks/:slug` — generic webhook delivery (spec §4.G, §6).
pub async fn deliver(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Query(params): Query<WebhookParams>,
    body: Option<Json<Value>>,
) -> impl IntoResponse {
    if let Some(challenge) = params.challenge.clone() {
        return (
            StatusCode::OK,
            Json(serde_json::json!({ "received": true, "action": "verification", "challenge": challenge })),
        )
            .into_response();
    }

    let identifier = params.identifier.clone().unwrap_or_default();
    let token = submitted_token(&headers, params.token.as_deref());
    let payload = body.map(|Json(v)| v).unwrap_or(Value::Null);

    let outcome = state
        .webhook_router
        .deliver(&slug, &identifier, token.as_deref(), payload);
    outcome_response(outcome)
}

/// `POST /webhooks/system/ui-form` — form-encoded delivery for the
/// built-in approve/resume UI pages (spec §4.G, §6).
pub async fn deliver_ui_form(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WebhookParams>,
    axum::extract::Form(form): axum::extract::Form<Vec<(String, String)>>,
) -> impl IntoResponse {
    let Some(identifier) = params.identifier.clone() else {
        return api_error(StatusCode::BAD_REQUEST, "identifier query parameter is required");
    };
    let token = submitted_token(&headers, params.token.as_deref());
    let payload = parse_ui_form(&form);

    let outcome = state
        .webhook_router
        .deliver("system/ui-form", &identifier, token.as_deref(), payload);
    outcome_response(outcome)
}
