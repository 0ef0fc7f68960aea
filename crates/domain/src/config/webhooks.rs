use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook Router
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Webhook Router settings (spec §4.G). CSRF protection is the
/// per-waiter `expected_token` compare in `runtime::webhooks` — there
/// is no HMAC signature verification in this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhooksConfig {
    /// Log a warning (instead of silently accepting) when a waiter has
    /// no `expected_token` and the delivery also carries none.
    #[serde(default = "d_true")]
    pub warn_on_missing_token: bool,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            warn_on_missing_token: true,
        }
    }
}

fn d_true() -> bool {
    true
}
