use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event Log & Monitor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Retention and persistence knobs for the run/event store (spec §4.D).
/// Retention policy itself is explicitly out of scope in spec.md §3;
/// this is the external knob the spec defers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Max number of runs kept in the in-memory ring before the oldest
    /// completed run is evicted (and pruned from the JSONL file).
    #[serde(default = "d_max_runs")]
    pub max_runs_in_memory: usize,

    /// Directory holding `runs.jsonl` / `events.jsonl`.
    #[serde(default = "d_state_dir")]
    pub state_dir: String,

    /// SSE broadcast channel capacity for `watchRunning()` subscribers.
    #[serde(default = "d_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_runs_in_memory: d_max_runs(),
            state_dir: d_state_dir(),
            broadcast_capacity: d_broadcast_capacity(),
        }
    }
}

fn d_max_runs() -> usize {
    2000
}
fn d_state_dir() -> String {
    "state".into()
}
fn d_broadcast_capacity() -> usize {
    256
}
