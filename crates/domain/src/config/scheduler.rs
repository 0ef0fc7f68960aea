use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cron-tick scheduler settings (spec §4.H). The tick interval is a
/// spec constant (60s); `missed_policy` and the catch-up cap govern
/// what happens when the process was down across one or more windows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "d_tick_interval")]
    pub tick_interval_secs: u64,

    /// What to do with cron windows missed while the process was down.
    #[serde(default)]
    pub missed_policy: MissedPolicy,

    /// Upper bound on runs fired to catch up a single schedule in one
    /// tick, when `missed_policy = catch_up`.
    #[serde(default = "d_max_catchup")]
    pub max_catchup_runs: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: d_tick_interval(),
            missed_policy: MissedPolicy::default(),
            max_catchup_runs: d_max_catchup(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    /// Drop missed windows; fire only the next one from now.
    Skip,
    /// Fire exactly once to catch up, regardless of how many windows
    /// were missed.
    #[default]
    RunOnce,
    /// Fire once per missed window, capped at `max_catchup_runs`.
    CatchUp,
}

fn d_tick_interval() -> u64 {
    60
}
fn d_max_catchup() -> u32 {
    5
}
