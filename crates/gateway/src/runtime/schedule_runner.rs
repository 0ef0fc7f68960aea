//! Scheduler actor (spec §4.H): a persistent 60 s alarm that scans
//! `schedules` for due rows and triggers Brain runs, correlating each
//! trigger's outcome back onto `scheduled_runs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::runtime::schedules::{cron_next_tz, parse_tz, MissedPolicy, Schedule, ScheduleStore};

/// Starts a Brain run for a scheduled trigger. Implemented by whatever
/// owns the Durable Runner (kept as a trait so the scheduler doesn't
/// depend on the runner's concrete type).
#[async_trait]
pub trait RunStarter: Send + Sync {
    async fn start_run(&self, brain_title: &str, run_id: &str) -> Result<(), String>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ConcurrencyGuard
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tracks in-flight run counts per schedule for single-flight locking.
pub struct ConcurrencyGuard {
    counts: RwLock<HashMap<String, Arc<AtomicU32>>>,
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyGuard {
    pub fn new() -> Self {
        Self {
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Try to acquire a slot. Returns `true` if under the limit.
    pub async fn try_acquire(&self, schedule_id: &str, max: u32) -> bool {
        let counter = {
            let mut map = self.counts.write().await;
            map.entry(schedule_id.to_owned())
                .or_insert_with(|| Arc::new(AtomicU32::new(0)))
                .clone()
        };
        let current = counter.load(Ordering::SeqCst);
        if current >= max {
            return false;
        }
        counter.fetch_add(1, Ordering::SeqCst);
        true
    }

    pub async fn release(&self, schedule_id: &str) {
        let map = self.counts.read().await;
        if let Some(counter) = map.get(schedule_id) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub async fn in_flight(&self, schedule_id: &str) -> u32 {
        let map = self.counts.read().await;
        map.get(schedule_id)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Missed-run calculation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Count how many cron windows were missed between `last_run_at` and `now`.
pub fn missed_window_count(
    cron: &str,
    tz: chrono_tz::Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let anchor = match last_run_at {
        Some(t) => t,
        None => return 1, // Never run — treat as one missed window.
    };
    let mut count = 0usize;
    let mut cursor = anchor;
    loop {
        match cron_next_tz(cron, &cursor, tz) {
            Some(next) if next <= *now => {
                count += 1;
                cursor = next;
                if count > max_catchup {
                    break;
                }
            }
            _ => break,
        }
    }
    count
}

/// Determine how many runs to fire based on the missed policy.
pub fn runs_to_fire(
    policy: MissedPolicy,
    cron: &str,
    tz: chrono_tz::Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: &DateTime<Utc>,
    max_catchup: usize,
) -> usize {
    let missed = missed_window_count(cron, tz, last_run_at, now, max_catchup);
    match policy {
        MissedPolicy::Skip => {
            if missed > 1 {
                0
            } else {
                missed
            }
        }
        MissedPolicy::RunOnce => missed.min(1),
        MissedPolicy::CatchUp => missed.min(max_catchup),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheduler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// In-process actor holding `schedules`/`scheduled_runs` (spec §4.H).
/// `tick()` is driven by a 60 s interval in `main.rs`; re-arming happens
/// unconditionally regardless of how the previous tick finished.
pub struct Scheduler {
    store: Arc<ScheduleStore>,
    concurrency: ConcurrencyGuard,
    starter: Arc<dyn RunStarter>,
}

impl Scheduler {
    pub fn new(store: Arc<ScheduleStore>, starter: Arc<dyn RunStarter>) -> Self {
        Self {
            store,
            concurrency: ConcurrencyGuard::new(),
            starter,
        }
    }

    /// One scan of due schedules (spec §4.H steps 1-3; step 4, re-arming
    /// the 60 s alarm, is the caller's loop).
    pub async fn tick(&self) {
        let due = self.store.due_schedules().await;
        let now = Utc::now();

        for schedule in due {
            let tz = parse_tz(&schedule.timezone);
            let n = runs_to_fire(
                schedule.missed_policy,
                &schedule.cron,
                tz,
                schedule.last_run_at,
                &now,
                schedule.max_catchup_runs,
            );
            if n == 0 {
                tracing::debug!(
                    schedule_id = %schedule.id,
                    policy = ?schedule.missed_policy,
                    "skipping missed windows"
                );
                self.store.skip_to_next(&schedule.id).await;
                continue;
            }

            for _ in 0..n {
                if !self
                    .concurrency
                    .try_acquire(&schedule.id, schedule.max_concurrency)
                    .await
                {
                    tracing::warn!(
                        schedule_id = %schedule.id,
                        max = schedule.max_concurrency,
                        "concurrency limit reached, skipping"
                    );
                    break;
                }
                self.fire(&schedule).await;
            }
        }
    }

    async fn fire(&self, schedule: &Schedule) {
        let run_id = format!("run_{}", uuid::Uuid::new_v4());
        tracing::info!(
            schedule_id = %schedule.id,
            brain_title = %schedule.brain_title,
            run_id = %run_id,
            "scheduler triggering brain run"
        );

        match self.starter.start_run(&schedule.brain_title, &run_id).await {
            Ok(()) => {
                self.store.record_triggered(&schedule.id, run_id).await;
                self.store.record_success(&schedule.id).await;
            }
            Err(e) => {
                self.store
                    .record_triggered(&schedule.id, run_id.clone())
                    .await;
                self.store.record_outcome(&run_id, Some(e.clone())).await;
                self.store.record_failure(&schedule.id, &e).await;
            }
        }
        self.concurrency.release(&schedule.id).await;
    }

    /// Called on run `COMPLETE`/`ERROR` to correlate `scheduled_runs`
    /// (spec §4.H: "subscribes to run events").
    pub async fn on_run_terminal(&self, run_id: &str, error: Option<String>) {
        self.store.record_outcome(run_id, error).await;
    }
}
