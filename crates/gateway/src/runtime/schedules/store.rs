//! `ScheduleStore` — persistent `schedules` + `scheduled_runs` tables
//! (spec §3, §4.H) with event broadcasting for the schedules SSE feed.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use super::cron::{cron_next_tz, parse_tz};
use super::model::{Schedule, ScheduleEvent, ScheduledRun, ScheduledRunStatus};

pub struct ScheduleStore {
    schedules: RwLock<HashMap<String, Schedule>>,
    scheduled_runs: RwLock<HashMap<String, ScheduledRun>>,
    schedules_path: PathBuf,
    runs_path: PathBuf,
    event_tx: broadcast::Sender<ScheduleEvent>,
}

impl ScheduleStore {
    pub fn new(state_path: &std::path::Path) -> Self {
        let schedules_path = state_path.join("schedules.json");
        let runs_path = state_path.join("scheduled_runs.json");
        let (event_tx, _) = broadcast::channel(64);

        let schedules = load_json(&schedules_path)
            .map(|v: Vec<Schedule>| v.into_iter().map(|s| (s.id.clone(), s)).collect())
            .unwrap_or_default();
        let scheduled_runs = load_json(&runs_path)
            .map(|v: Vec<ScheduledRun>| v.into_iter().map(|r| (r.id.clone(), r)).collect())
            .unwrap_or_default();

        Self {
            schedules: RwLock::new(schedules),
            scheduled_runs: RwLock::new(scheduled_runs),
            schedules_path,
            runs_path,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.event_tx.subscribe()
    }

    async fn persist_schedules(&self) {
        let map = self.schedules.read().await;
        let values: Vec<&Schedule> = map.values().collect();
        persist_json(&self.schedules_path, &values).await;
    }

    async fn persist_runs(&self) {
        let map = self.scheduled_runs.read().await;
        let values: Vec<&ScheduledRun> = map.values().collect();
        persist_json(&self.runs_path, &values).await;
    }

    // ── Schedules ────────────────────────────────────────────────────

    pub async fn list(&self) -> Vec<Schedule> {
        self.schedules.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Schedule> {
        self.schedules.read().await.get(id).cloned()
    }

    pub async fn insert(&self, mut schedule: Schedule) -> Schedule {
        if schedule.enabled {
            let tz = parse_tz(&schedule.timezone);
            schedule.next_run_at = cron_next_tz(&schedule.cron, &Utc::now(), tz);
        }
        let view = schedule.to_view();
        self.schedules
            .write()
            .await
            .insert(schedule.id.clone(), schedule.clone());
        self.persist_schedules().await;
        let _ = self.event_tx.send(ScheduleEvent::ScheduleUpdated { schedule: view });
        schedule
    }

    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.schedules.write().await.remove(id).is_some();
        if removed {
            self.persist_schedules().await;
        }
        removed
    }

    pub async fn update<F: FnOnce(&mut Schedule)>(&self, id: &str, f: F) -> Option<Schedule> {
        let updated = {
            let mut map = self.schedules.write().await;
            let s = map.get_mut(id)?;
            f(s);
            s.updated_at = Utc::now();
            s.clone()
        };
        self.persist_schedules().await;
        let _ = self.event_tx.send(ScheduleEvent::ScheduleUpdated {
            schedule: updated.to_view(),
        });
        Some(updated)
    }

    /// Schedules due to fire: `enabled AND next_run_at <= now`.
    pub async fn due_schedules(&self) -> Vec<Schedule> {
        let now = Utc::now();
        self.schedules
            .read()
            .await
            .values()
            .filter(|s| s.enabled && s.next_run_at.is_some_and(|t| t <= now))
            .cloned()
            .collect()
    }

    pub async fn record_success(&self, id: &str) {
        self.update(id, |s| {
            s.last_run_at = Some(Utc::now());
            s.consecutive_failures = 0;
            s.last_error = None;
            let tz = parse_tz(&s.timezone);
            s.next_run_at = cron_next_tz(&s.cron, &Utc::now(), tz);
        })
        .await;
    }

    pub async fn record_failure(&self, id: &str, error: &str) {
        let err = error.to_owned();
        self.update(id, |s| {
            s.last_run_at = Some(Utc::now());
            s.consecutive_failures += 1;
            s.last_error = Some(err);
            let tz = parse_tz(&s.timezone);
            s.next_run_at = cron_next_tz(&s.cron, &Utc::now(), tz);
        })
        .await;
    }

    /// Advance `next_run_at` without recording a run (missed window dropped).
    pub async fn skip_to_next(&self, id: &str) {
        self.update(id, |s| {
            let tz = parse_tz(&s.timezone);
            s.next_run_at = cron_next_tz(&s.cron, &Utc::now(), tz);
        })
        .await;
    }

    // ── Scheduled runs ──────────────────────────────────────────────

    pub async fn record_triggered(&self, schedule_id: &str, run_id: String) -> ScheduledRun {
        let row = ScheduledRun {
            id: format!("scheduled_run_{run_id}"),
            schedule_id: schedule_id.to_owned(),
            brain_run_id: Some(run_id.clone()),
            status: ScheduledRunStatus::Triggered,
            ran_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        self.scheduled_runs
            .write()
            .await
            .insert(row.id.clone(), row.clone());
        self.persist_runs().await;
        let _ = self.event_tx.send(ScheduleEvent::ScheduleRunStarted {
            schedule_id: schedule_id.to_owned(),
            run_id,
        });
        row
    }

    /// Update the `scheduled_runs` row correlated with `brain_run_id` on
    /// that run's `COMPLETE`/`ERROR` (spec §4.H).
    pub async fn record_outcome(&self, brain_run_id: &str, error: Option<String>) {
        let matched_schedule_id = {
            let mut map = self.scheduled_runs.write().await;
            let row = map
                .values_mut()
                .find(|r| r.brain_run_id.as_deref() == Some(brain_run_id));
            match row {
                Some(row) => {
                    row.completed_at = Some(Utc::now());
                    row.status = if error.is_some() {
                        ScheduledRunStatus::Error
                    } else {
                        ScheduledRunStatus::Complete
                    };
                    row.error = error;
                    Some(row.schedule_id.clone())
                }
                None => None,
            }
        };
        self.persist_runs().await;
        if let Some(schedule_id) = matched_schedule_id {
            let _ = self.event_tx.send(ScheduleEvent::ScheduleRunCompleted {
                schedule_id,
                run_id: brain_run_id.to_owned(),
            });
        }
    }

    pub async fn list_runs(&self, schedule_id: Option<&str>, limit: usize) -> Vec<ScheduledRun> {
        let map = self.scheduled_runs.read().await;
        let mut rows: Vec<ScheduledRun> = map
            .values()
            .filter(|r| schedule_id.is_none_or(|id| r.schedule_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.ran_at.cmp(&a.ran_at));
        rows.truncate(limit);
        rows
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Option<T> {
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

async fn persist_json<T: serde::Serialize>(path: &std::path::Path, value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        let path = path.to_path_buf();
        let _ = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(error = %e, path = %path.display(), "failed to persist schedule state");
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_schedule(id: &str, cron: &str, enabled: bool) -> Schedule {
        Schedule {
            id: id.into(),
            brain_title: "daily".into(),
            cron: cron.into(),
            timezone: "UTC".into(),
            enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            next_run_at: None,
            last_run_at: None,
            missed_policy: super::super::model::MissedPolicy::default(),
            max_concurrency: 1,
            max_catchup_runs: 5,
            last_error: None,
            consecutive_failures: 0,
        }
    }

    #[tokio::test]
    async fn insert_computes_next_run_at_when_enabled() {
        let dir = tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        let s = store.insert(new_schedule("s1", "* * * * *", true)).await;
        assert!(s.next_run_at.is_some());
    }

    #[tokio::test]
    async fn disabled_schedule_never_due() {
        let dir = tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        store.insert(new_schedule("s1", "* * * * *", false)).await;
        assert!(store.due_schedules().await.is_empty());
    }

    #[tokio::test]
    async fn record_failure_increments_consecutive_failures() {
        let dir = tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        store.insert(new_schedule("s1", "* * * * *", true)).await;
        store.record_failure("s1", "boom").await;
        let s = store.get("s1").await.unwrap();
        assert_eq!(s.consecutive_failures, 1);
        assert_eq!(s.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn record_success_resets_failures() {
        let dir = tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        store.insert(new_schedule("s1", "* * * * *", true)).await;
        store.record_failure("s1", "boom").await;
        store.record_success("s1").await;
        let s = store.get("s1").await.unwrap();
        assert_eq!(s.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn triggered_then_completed_outcome_roundtrip() {
        let dir = tempdir().unwrap();
        let store = ScheduleStore::new(dir.path());
        store.insert(new_schedule("s1", "* * * * *", true)).await;
        store.record_triggered("s1", "run_1".into()).await;
        store.record_outcome("run_1", None).await;
        let runs = store.list_runs(Some("s1"), 10).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, ScheduledRunStatus::Complete);
        assert!(runs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn reload_from_disk_restores_state() {
        let dir = tempdir().unwrap();
        {
            let store = ScheduleStore::new(dir.path());
            store.insert(new_schedule("s1", "* * * * *", true)).await;
            store.record_triggered("s1", "run_1".into()).await;
        }
        let reopened = ScheduleStore::new(dir.path());
        assert!(reopened.get("s1").await.is_some());
        assert_eq!(reopened.list_runs(None, 10).await.len(), 1);
    }
}
