//! Webhook Router (spec §4.G) — matches an inbound delivery to a
//! `(slug, identifier)` waiter, validates its CSRF token, checks the
//! run state machine will actually accept `WEBHOOK_RESPONSE`, then
//! enqueues the signal and wakes the runner.
//!
//! This module holds the delivery *algorithm*; `api::webhooks` is the
//! axum-facing adapter that parses the request body and calls
//! [`WebhookRouter::deliver`].

use std::sync::Arc;

use sa_domain::signal::Signal;
use sa_domain::state_machine::is_signal_valid;
use serde::Serialize;
use serde_json::Value;

use crate::runtime::monitor::Monitor;
use crate::runtime::signals::SignalQueues;

/// Outcome of a webhook delivery, mirroring spec §4.G's response shapes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// No waiter registered for `(slug, identifier)` — `404`.
    NotFound,
    /// CSRF token missing or mismatched — `403`.
    Ignored { reason: String },
    /// State machine would reject `WEBHOOK_RESPONSE` from the run's
    /// current status (e.g. already terminal) — still `200`, per spec.
    IgnoredStale,
    /// Signal enqueued and the runner woken.
    Resumed { run_id: String },
}

/// A handler may answer a challenge (Slack/Stripe URL verification)
/// instead of resuming a run. The router never touches a waiter for
/// this path.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Verification {
    pub challenge: Value,
}

pub struct WebhookRouter {
    monitor: Arc<Monitor>,
    signals: Arc<SignalQueues>,
    warn_on_missing_token: bool,
}

impl WebhookRouter {
    pub fn new(monitor: Arc<Monitor>, signals: Arc<SignalQueues>, warn_on_missing_token: bool) -> Self {
        Self { monitor, signals, warn_on_missing_token }
    }

    /// Deliver a webhook payload to the waiter at `(slug, identifier)`
    /// (spec §4.G steps 1-6).
    pub fn deliver(&self, slug: &str, identifier: &str, submitted_token: Option<&str>, body: Value) -> DeliveryOutcome {
        let Some(waiter) = self.monitor.consume_waiter(slug, identifier) else {
            return DeliveryOutcome::NotFound;
        };

        if let Err(reason) = validate_token(waiter.expected_token.as_deref(), submitted_token, self.warn_on_missing_token) {
            // The waiter was already consumed; re-register it so a
            // legitimate retry can still land.
            self.monitor.register_waiter(slug.to_string(), identifier.to_string(), waiter);
            return DeliveryOutcome::Ignored { reason };
        }

        let Some(run) = self.monitor.get(&waiter.run_id) else {
            return DeliveryOutcome::IgnoredStale;
        };
        if !is_signal_valid(run.status, &Signal::WebhookResponse { payload: body.clone() }) {
            return DeliveryOutcome::IgnoredStale;
        }

        self.signals.enqueue(&waiter.run_id, Signal::WebhookResponse { payload: body });
        DeliveryOutcome::Resumed { run_id: waiter.run_id }
    }
}

/// Validate submitted vs expected CSRF token (spec §4.G step 3).
fn validate_token(expected: Option<&str>, submitted: Option<&str>, warn_on_missing: bool) -> Result<(), String> {
    use subtle::ConstantTimeEq;
    match (expected, submitted) {
        (None, None) => {
            if warn_on_missing {
                tracing::warn!("webhook delivered with no expected_token and no submitted token");
            }
            Ok(())
        }
        (None, Some(_)) => Ok(()),
        (Some(_), None) => Err("missing token".to_string()),
        (Some(exp), Some(got)) => {
            if bool::from(exp.as_bytes().ct_eq(got.as_bytes())) {
                Ok(())
            } else {
                Err("token mismatch".to_string())
            }
        }
    }
}

/// Parse a `system/ui-form` form body into `{ key: string | string[] }`,
/// preserving `key[]` array semantics (spec §4.G).
pub fn parse_ui_form(pairs: &[(String, String)]) -> Value {
    let mut map = serde_json::Map::new();
    for (raw_key, value) in pairs {
        let (key, is_array) = match raw_key.strip_suffix("[]") {
            Some(base) => (base.to_string(), true),
            None => (raw_key.clone(), false),
        };
        if is_array {
            map.entry(key)
                .or_insert_with(|| Value::Array(Vec::new()))
                .as_array_mut()
                .expect("array entry")
                .push(Value::String(value.clone()));
        } else if let Some(existing) = map.get_mut(&key) {
            // A later scalar with the same key as an earlier one:
            // promote to an array rather than silently overwrite.
            match existing {
                Value::Array(arr) => arr.push(Value::String(value.clone())),
                other => {
                    let prev = other.clone();
                    *other = Value::Array(vec![prev, Value::String(value.clone())]);
                }
            }
        } else {
            map.insert(key, Value::String(value.clone()));
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::monitor::{Run, Waiter};
    use chrono::Utc;

    fn monitor() -> Arc<Monitor> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(Monitor::new(dir.path(), 100, 16))
    }

    fn router() -> (Arc<Monitor>, Arc<SignalQueues>, WebhookRouter) {
        let monitor = monitor();
        let signals = Arc::new(SignalQueues::new());
        let router = WebhookRouter::new(monitor.clone(), signals.clone(), true);
        (monitor, signals, router)
    }

    fn waiting_run(monitor: &Monitor, run_id: &str) {
        let mut run = Run::new(run_id.to_string(), "b".into(), serde_json::json!({}), serde_json::json!({}));
        run.status = sa_domain::state_machine::RunState::Waiting;
        monitor.register(run);
    }

    #[test]
    fn delivery_with_no_waiter_is_not_found() {
        let (_m, _s, router) = router();
        let outcome = router.deliver("approve", "run_1", None, serde_json::json!({}));
        assert_eq!(outcome, DeliveryOutcome::NotFound);
    }

    #[test]
    fn delivery_resumes_run_and_enqueues_signal() {
        let (monitor, signals, router) = router();
        waiting_run(&monitor, "run_1");
        monitor.register_waiter(
            "approve".into(),
            "run_1".into(),
            Waiter { run_id: "run_1".into(), expected_token: None, created_at: Utc::now() },
        );
        let outcome = router.deliver("approve", "run_1", None, serde_json::json!({"ok": true}));
        assert_eq!(outcome, DeliveryOutcome::Resumed { run_id: "run_1".into() });
        assert_eq!(signals.pending_count("run_1"), 1);
    }

    #[test]
    fn missing_expected_token_when_required_is_ignored() {
        let (monitor, _s, router) = router();
        waiting_run(&monitor, "run_1");
        monitor.register_waiter(
            "approve".into(),
            "run_1".into(),
            Waiter { run_id: "run_1".into(), expected_token: Some("secret".into()), created_at: Utc::now() },
        );
        let outcome = router.deliver("approve", "run_1", None, serde_json::json!({}));
        assert!(matches!(outcome, DeliveryOutcome::Ignored { .. }));
    }

    #[test]
    fn mismatched_token_is_ignored() {
        let (monitor, _s, router) = router();
        waiting_run(&monitor, "run_1");
        monitor.register_waiter(
            "approve".into(),
            "run_1".into(),
            Waiter { run_id: "run_1".into(), expected_token: Some("secret".into()), created_at: Utc::now() },
        );
        let outcome = router.deliver("approve", "run_1", Some("wrong"), serde_json::json!({}));
        assert!(matches!(outcome, DeliveryOutcome::Ignored { .. }));
    }

    #[test]
    fn matching_token_resumes() {
        let (monitor, signals, router) = router();
        waiting_run(&monitor, "run_1");
        monitor.register_waiter(
            "approve".into(),
            "run_1".into(),
            Waiter { run_id: "run_1".into(), expected_token: Some("secret".into()), created_at: Utc::now() },
        );
        let outcome = router.deliver("approve", "run_1", Some("secret"), serde_json::json!({}));
        assert_eq!(outcome, DeliveryOutcome::Resumed { run_id: "run_1".into() });
        assert_eq!(signals.pending_count("run_1"), 1);
    }

    #[test]
    fn stale_run_status_is_ignored_without_enqueue() {
        let (monitor, signals, router) = router();
        let mut run = Run::new("run_1".into(), "b".into(), serde_json::json!({}), serde_json::json!({}));
        run.status = sa_domain::state_machine::RunState::Complete;
        monitor.register(run);
        monitor.register_waiter(
            "approve".into(),
            "run_1".into(),
            Waiter { run_id: "run_1".into(), expected_token: None, created_at: Utc::now() },
        );
        let outcome = router.deliver("approve", "run_1", None, serde_json::json!({}));
        assert_eq!(outcome, DeliveryOutcome::IgnoredStale);
        assert_eq!(signals.pending_count("run_1"), 0);
    }

    #[test]
    fn failed_csrf_check_re_registers_waiter_for_retry() {
        let (monitor, _s, router) = router();
        waiting_run(&monitor, "run_1");
        monitor.register_waiter(
            "approve".into(),
            "run_1".into(),
            Waiter { run_id: "run_1".into(), expected_token: Some("secret".into()), created_at: Utc::now() },
        );
        router.deliver("approve", "run_1", Some("wrong"), serde_json::json!({}));
        // Waiter should still be there for a legitimate retry.
        let outcome = router.deliver("approve", "run_1", Some("secret"), serde_json::json!({}));
        assert!(matches!(outcome, DeliveryOutcome::Resumed { .. }));
    }

    // ── parse_ui_form ────────────────────────────────────────────────

    #[test]
    fn ui_form_scalar_fields() {
        let value = parse_ui_form(&[("name".into(), "alice".into())]);
        assert_eq!(value, serde_json::json!({"name": "alice"}));
    }

    #[test]
    fn ui_form_array_fields_preserve_key_brackets() {
        let value = parse_ui_form(&[
            ("tags[]".into(), "a".into()),
            ("tags[]".into(), "b".into()),
        ]);
        assert_eq!(value, serde_json::json!({"tags": ["a", "b"]}));
    }

    #[test]
    fn ui_form_repeated_scalar_key_promotes_to_array() {
        let value = parse_ui_form(&[
            ("color".into(), "red".into()),
            ("color".into(), "blue".into()),
        ]);
        assert_eq!(value, serde_json::json!({"color": ["red", "blue"]}));
    }
}
