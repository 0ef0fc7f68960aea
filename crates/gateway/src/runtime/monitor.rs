//! Event Log & Monitor (spec §3, §4.D).
//!
//! Owns the append-only per-run `Event` log and the `Run` projection
//! derived from it. Generalizes the teacher's `RunStore` (bounded ring
//! + `HashMap` index + JSONL persistence + `broadcast` SSE fan-out)
//! from a flat chat-turn record to the full run/event/waiter model.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use sa_domain::event::{Event, EventBody, SerializedError, WebhookRegistration};
use sa_domain::patch;
use sa_domain::state_machine::RunState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run projection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub brain_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brain_description: Option<String>,
    pub status: RunState,
    pub options: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SerializedError>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub current_step_index: usize,
    pub step_statuses: Vec<StepStatus>,
    pub state: serde_json::Value,
}

impl Run {
    pub fn new(run_id: String, brain_title: String, options: serde_json::Value, initial_state: serde_json::Value) -> Self {
        Self {
            run_id,
            brain_title,
            brain_description: None,
            status: RunState::Idle,
            options,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            current_step_index: 0,
            step_statuses: Vec::new(),
            state: initial_state,
        }
    }

    /// Public-facing status, projecting `agentLoop -> running` (spec §4.C).
    pub fn public_status(&self) -> RunState {
        self.status.public_status()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningBrainSummary {
    pub run_id: String,
    pub brain_title: String,
    pub status: RunState,
    pub current_step_index: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningSnapshot {
    pub running_brains: Vec<RunningBrainSummary>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Webhook waiter table
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct Waiter {
    pub run_id: String,
    pub expected_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Monitor store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct RunsInner {
    runs: VecDeque<Run>,
    index: HashMap<String, usize>,
    base_seq: usize,
}

impl RunsInner {
    fn new(runs: VecDeque<Run>) -> Self {
        let mut index = HashMap::with_capacity(runs.len());
        for (i, run) in runs.iter().enumerate() {
            index.insert(run.run_id.clone(), i);
        }
        Self { runs, index, base_seq: 0 }
    }

    fn deque_idx(&self, seq: usize) -> usize {
        seq - self.base_seq
    }

    fn get(&self, run_id: &str) -> Option<&Run> {
        let seq = *self.index.get(run_id)?;
        self.runs.get(self.deque_idx(seq))
    }

    fn get_mut(&mut self, run_id: &str) -> Option<&mut Run> {
        let seq = *self.index.get(run_id)?;
        let idx = self.deque_idx(seq);
        self.runs.get_mut(idx)
    }

    fn push_back(&mut self, run: Run) {
        let seq = self.base_seq + self.runs.len();
        self.index.insert(run.run_id.clone(), seq);
        self.runs.push_back(run);
    }

    fn pop_front(&mut self) -> Option<Run> {
        let run = self.runs.pop_front()?;
        self.index.remove(&run.run_id);
        self.base_seq += 1;
        Some(run)
    }
}

/// Owns Event rows and the Run projection (spec §3: "Ownership").
pub struct Monitor {
    runs: RwLock<RunsInner>,
    events: RwLock<HashMap<String, Vec<Event>>>,
    waiters: RwLock<HashMap<(String, String), Waiter>>,
    max_runs: usize,
    runs_log: PathBuf,
    events_log: PathBuf,
    running_tx: broadcast::Sender<RunningSnapshot>,
}

impl Monitor {
    pub fn new(state_dir: &Path, max_runs: usize, broadcast_capacity: usize) -> Self {
        std::fs::create_dir_all(state_dir).ok();
        let runs_log = state_dir.join("runs.jsonl");
        let events_log = state_dir.join("events.jsonl");

        let (runs, total_on_disk) = Self::load_runs(&runs_log, max_runs);
        if total_on_disk > runs.len() {
            Self::rewrite_jsonl(&runs_log, runs.iter());
        }
        let events = Self::load_events(&events_log);

        let (running_tx, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            runs: RwLock::new(RunsInner::new(runs)),
            events: RwLock::new(events),
            waiters: RwLock::new(HashMap::new()),
            max_runs,
            runs_log,
            events_log,
            running_tx,
        }
    }

    fn load_runs(path: &Path, max_runs: usize) -> (VecDeque<Run>, usize) {
        let mut runs = VecDeque::new();
        let mut total = 0;
        if let Ok(content) = std::fs::read_to_string(path) {
            let lines: Vec<&str> = content.lines().collect();
            total = lines.len();
            for line in lines.iter().rev().take(max_runs) {
                if let Ok(run) = serde_json::from_str::<Run>(line) {
                    runs.push_front(run);
                }
            }
        }
        (runs, total)
    }

    fn load_events(path: &Path) -> HashMap<String, Vec<Event>> {
        let mut out: HashMap<String, Vec<Event>> = HashMap::new();
        if let Ok(content) = std::fs::read_to_string(path) {
            for line in content.lines() {
                if let Ok(ev) = serde_json::from_str::<Event>(line) {
                    out.entry(ev.run_id.clone()).or_default().push(ev);
                }
            }
        }
        out
    }

    fn rewrite_jsonl<'a>(path: &Path, runs: impl Iterator<Item = &'a Run>) {
        let tmp = path.with_extension("jsonl.tmp");
        let mut ok = false;
        if let Ok(mut f) = std::fs::File::create(&tmp) {
            ok = true;
            for run in runs {
                if let Ok(json) = serde_json::to_string(run) {
                    if writeln!(f, "{json}").is_err() {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if ok {
            let _ = std::fs::rename(&tmp, path);
        } else {
            let _ = std::fs::remove_file(&tmp);
        }
    }

    fn persist_run(&self, run: &Run) {
        if let Ok(json) = serde_json::to_string(run) {
            if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&self.runs_log) {
                let _ = writeln!(f, "{json}");
            }
        }
    }

    fn persist_event(&self, ev: &Event) {
        if let Ok(json) = serde_json::to_string(ev) {
            if let Ok(mut f) = std::fs::OpenOptions::new().create(true).append(true).open(&self.events_log) {
                let _ = writeln!(f, "{json}");
            }
        }
    }

    /// Register a new run's projection row. Must happen before the
    /// first `append` for that `run_id`.
    pub fn register(&self, run: Run) {
        self.persist_run(&run);
        let mut runs = self.runs.write();
        runs.push_back(run);
        if runs.runs.len() > self.max_runs {
            runs.pop_front();
        }
    }

    /// `append(run_id, event)` — atomic insert + projection update
    /// (spec §4.D). Updates `state` via fold when the event carries a
    /// patch (`STEP_COMPLETE`).
    pub fn append(&self, event: Event) {
        self.persist_event(&event);
        {
            let mut events = self.events.write();
            events.entry(event.run_id.clone()).or_default().push(event.clone());
        }

        let mut runs = self.runs.write();
        let Some(run) = runs.get_mut(&event.run_id) else { return };

        let prev_public = run.public_status();

        match &event.body {
            EventBody::Start | EventBody::Restart => {
                run.status = RunState::Running;
                run.started_at.get_or_insert(event.ts);
            }
            EventBody::StepStart { step_index, .. } => {
                run.current_step_index = *step_index;
                while run.step_statuses.len() <= *step_index {
                    run.step_statuses.push(StepStatus::Pending);
                }
                run.step_statuses[*step_index] = StepStatus::Running;
            }
            EventBody::StepComplete { step_index, patch: p } => {
                if let Ok(next) = patch::apply(&run.state, p) {
                    run.state = next;
                }
                if *step_index < run.step_statuses.len() {
                    run.step_statuses[*step_index] = StepStatus::Complete;
                }
            }
            EventBody::AgentStart { .. } => run.status = RunState::AgentLoop,
            EventBody::AgentComplete { .. } => run.status = RunState::Running,
            EventBody::Webhook { .. } => run.status = RunState::Waiting,
            EventBody::WebhookResponse { .. } => run.status = RunState::Running,
            EventBody::Paused => run.status = RunState::Paused,
            EventBody::Resumed => run.status = RunState::Running,
            EventBody::Cancelled => {
                run.status = RunState::Cancelled;
                run.completed_at = Some(event.ts);
            }
            EventBody::Error { error } => {
                run.status = RunState::Error;
                run.error = Some(error.clone());
                run.completed_at = Some(event.ts);
            }
            EventBody::Complete => {
                run.status = RunState::Complete;
                run.completed_at = Some(event.ts);
            }
            _ => {}
        }

        let new_public = run.public_status();
        self.persist_run(run);
        let changed_running = prev_public != new_public && (prev_public == RunState::Running || new_public == RunState::Running);
        drop(runs);
        if changed_running || event.body.is_terminal() {
            self.broadcast_running();
        }
    }

    fn broadcast_running(&self) {
        let runs = self.runs.read();
        let running_brains = runs
            .runs
            .iter()
            .filter(|r| r.public_status() == RunState::Running)
            .map(|r| RunningBrainSummary {
                run_id: r.run_id.clone(),
                brain_title: r.brain_title.clone(),
                status: r.status,
                current_step_index: r.current_step_index,
            })
            .collect();
        let _ = self.running_tx.send(RunningSnapshot { running_brains });
    }

    /// `history(brain_title, limit)` — latest runs by `created_at desc`.
    pub fn history(&self, brain_title: &str, limit: usize) -> Vec<Run> {
        let runs = self.runs.read();
        runs.runs
            .iter()
            .rev()
            .filter(|r| r.brain_title == brain_title)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn list_brains(&self) -> Vec<String> {
        let runs = self.runs.read();
        let mut titles: Vec<String> = runs.runs.iter().map(|r| r.brain_title.clone()).collect();
        titles.sort();
        titles.dedup();
        titles
    }

    pub fn get(&self, run_id: &str) -> Option<Run> {
        self.runs.read().get(run_id).cloned()
    }

    /// `events(run_id, since_seq?)` — replay.
    pub fn events(&self, run_id: &str, since_seq: Option<u64>) -> Vec<Event> {
        let events = self.events.read();
        match events.get(run_id) {
            None => Vec::new(),
            Some(list) => list
                .iter()
                .filter(|e| since_seq.map_or(true, |s| e.seq > s))
                .cloned()
                .collect(),
        }
    }

    pub fn next_seq(&self, run_id: &str) -> u64 {
        self.events.read().get(run_id).map(|v| v.len() as u64).unwrap_or(0)
    }

    /// SSE stream subscription for `watchRunning()`.
    pub fn watch_running(&self) -> broadcast::Receiver<RunningSnapshot> {
        self.running_tx.subscribe()
    }

    pub fn register_waiter(&self, slug: String, identifier: String, waiter: Waiter) {
        self.waiters.write().insert((slug, identifier), waiter);
    }

    /// `findWaitingBrain(slug, identifier)` — returns `{run_id, token?}`
    /// without consuming. The router consumes separately once the
    /// delivery passes CSRF + admissibility checks.
    pub fn find_waiting_brain(&self, slug: &str, identifier: &str) -> Option<(String, Option<String>)> {
        let waiters = self.waiters.read();
        waiters
            .get(&(slug.to_string(), identifier.to_string()))
            .map(|w| (w.run_id.clone(), w.expected_token.clone()))
    }

    pub fn consume_waiter(&self, slug: &str, identifier: &str) -> Option<Waiter> {
        self.waiters.write().remove(&(slug.to_string(), identifier.to_string()))
    }
}
