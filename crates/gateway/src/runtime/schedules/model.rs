//! Schedule data model (spec §3, §4.H): `Schedule` triggers Brain runs on
//! a cron tick; `ScheduledRun` correlates each trigger with its outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happens when the runner discovers a missed window.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    /// Drop the missed run silently.
    Skip,
    /// Fire exactly once, no matter how many windows were missed.
    #[default]
    RunOnce,
    /// Fire once for every missed window (with back-off cap).
    CatchUp,
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_max_catchup_runs() -> usize {
    5
}

/// A cron-triggered Brain (spec §3: `{ id, brain_title, cron, enabled,
/// created_at, next_run_at }`), plus the runner bookkeeping needed to
/// implement missed-window policy and single-flight concurrency.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub brain_title: String,
    /// 5-field cron expression: "minute hour dom month dow".
    pub cron: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub missed_policy: MissedPolicy,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_max_catchup_runs")]
    pub max_catchup_runs: usize,

    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
    Error,
}

impl Schedule {
    pub fn computed_status(&self) -> ScheduleStatus {
        if !self.enabled {
            ScheduleStatus::Paused
        } else if self.consecutive_failures > 0 {
            ScheduleStatus::Error
        } else {
            ScheduleStatus::Active
        }
    }

    pub fn to_view(&self) -> ScheduleView {
        ScheduleView {
            schedule: self.clone(),
            status: self.computed_status(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ScheduleView {
    #[serde(flatten)]
    pub schedule: Schedule,
    pub status: ScheduleStatus,
}

/// Status of one triggered run (spec §3).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledRunStatus {
    Triggered,
    Complete,
    Error,
}

/// `ScheduledRun` (spec §3): `{ id, schedule_id, brain_run_id?, status,
/// ran_at, completed_at?, error? }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduledRun {
    pub id: String,
    pub schedule_id: String,
    pub brain_run_id: Option<String>,
    pub status: ScheduledRunStatus,
    pub ran_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleEvent {
    ScheduleUpdated { schedule: ScheduleView },
    ScheduleRunStarted { schedule_id: String, run_id: String },
    ScheduleRunCompleted { schedule_id: String, run_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schedule(enabled: bool, consecutive_failures: u32) -> Schedule {
        Schedule {
            id: "sch_1".into(),
            brain_title: "daily".into(),
            cron: "0 * * * *".into(),
            timezone: "UTC".into(),
            enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            next_run_at: None,
            last_run_at: None,
            missed_policy: MissedPolicy::default(),
            max_concurrency: 1,
            max_catchup_runs: 5,
            last_error: if consecutive_failures > 0 {
                Some("boom".into())
            } else {
                None
            },
            consecutive_failures,
        }
    }

    #[test]
    fn computed_status_active() {
        assert_eq!(test_schedule(true, 0).computed_status(), ScheduleStatus::Active);
    }

    #[test]
    fn computed_status_paused_trumps_error() {
        assert_eq!(test_schedule(false, 5).computed_status(), ScheduleStatus::Paused);
    }

    #[test]
    fn computed_status_error() {
        assert_eq!(test_schedule(true, 2).computed_status(), ScheduleStatus::Error);
    }

    #[test]
    fn schedule_deserializes_with_defaults() {
        let json = serde_json::json!({
            "id": "sch_2",
            "brain_title": "weekly",
            "cron": "0 9 * * 1",
            "enabled": true,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
            "next_run_at": null,
            "last_run_at": null,
        });
        let s: Schedule = serde_json::from_value(json).unwrap();
        assert_eq!(s.timezone, "UTC");
        assert_eq!(s.missed_policy, MissedPolicy::RunOnce);
        assert_eq!(s.max_concurrency, 1);
        assert_eq!(s.max_catchup_runs, 5);
        assert_eq!(s.consecutive_failures, 0);
    }

    #[test]
    fn missed_policy_serde_roundtrip() {
        for p in [MissedPolicy::Skip, MissedPolicy::RunOnce, MissedPolicy::CatchUp] {
            let json = serde_json::to_string(&p).unwrap();
            let back: MissedPolicy = serde_json::from_str(&json).unwrap();
            assert_eq!(p, back);
        }
    }
}
