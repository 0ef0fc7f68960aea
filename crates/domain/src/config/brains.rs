use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Brain engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Brain manifest resolution and default execution limits (spec §4.B,
/// §4.F.1 — `maxIterations`/`maxTokens` when a brain's `Agent` block
/// doesn't override them).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainsConfig {
    /// Directory `Manifest::resolve`/`list`/`search` scan for `.brain`
    /// definitions.
    #[serde(default = "d_manifest_dir")]
    pub manifest_dir: String,

    /// Default `Agent.maxIterations` when a block's `configFn` omits it.
    #[serde(default = "d_max_iterations")]
    pub default_max_iterations: u32,

    /// Default `Agent.maxTokens` ceiling. `None` leaves the agent loop
    /// unbounded on tokens (still bounded by `max_iterations`).
    #[serde(default)]
    pub default_max_tokens: Option<u64>,

    /// Default `Step`/`BatchPrompt` retry attempts when a block omits
    /// its own `retry` policy.
    #[serde(default = "d_retry_attempts")]
    pub default_retry_max_attempts: u32,
}

impl Default for BrainsConfig {
    fn default() -> Self {
        Self {
            manifest_dir: d_manifest_dir(),
            default_max_iterations: d_max_iterations(),
            default_max_tokens: None,
            default_retry_max_attempts: d_retry_attempts(),
        }
    }
}

fn d_manifest_dir() -> String {
    "brains".into()
}
fn d_max_iterations() -> u32 {
    25
}
fn d_retry_attempts() -> u32 {
    1
}
