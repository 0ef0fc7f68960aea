//! The Durable Runner (spec §4.F) — single-writer actor per `run_id`.
//!
//! Executes a Brain's blocks sequentially, journaling every state
//! change as an `Event` so a restart can resume from the log rather
//! than from in-memory state. `BlockOutcome` is how a block tells the
//! drive loop whether to advance, park (webhook/pause), or stop the
//! run outright.

use std::sync::Arc;

use sa_domain::brain::{Block, Brain, ErrorPolicy, RetryPolicy, SharedResources, StepAction, StepContext, StepOutcome};
use sa_domain::error::{Error, Result};
use sa_domain::event::{Event, EventBody, EventKind, SerializedError, WebhookRegistration};
use sa_domain::patch;
use sa_domain::signal::{Signal, SignalFilter};
use sa_domain::state_machine::{self, RunState};
use serde_json::Value;

use super::agent_loop::{self, AgentBlockOutcome, AgentLoopDeps};
use super::client::ObjectGenerator;
use crate::runtime::monitor::{Monitor, Waiter};
use crate::runtime::run_lock::RunLockMap;
use crate::runtime::schedule_runner::RunStarter;
use crate::runtime::signals::SignalQueues;

/// Events whose kind participates in the run state machine. Every
/// other kind (`STEP_COMPLETE`, `STEP_RETRY`, `AGENT_TOOL_CALL`, ...)
/// is a log-only observation and bypasses `apply_transition` — it
/// never changes `status` on its own.
fn is_transition_kind(kind: EventKind) -> bool {
    matches!(
        kind,
        EventKind::Start
            | EventKind::Restart
            | EventKind::StepStart
            | EventKind::AgentStart
            | EventKind::AgentComplete
            | EventKind::Webhook
            | EventKind::WebhookResponse
            | EventKind::Paused
            | EventKind::Resumed
            | EventKind::AgentUserMessage
            | EventKind::Cancelled
            | EventKind::Complete
            | EventKind::Error
    )
}

enum BlockOutcome {
    Continue,
    /// Block parked the run (webhook wait or pause handed off mid-block).
    Parked,
    Cancelled,
    /// A `Guard` predicate evaluated false; `COMPLETE` was already emitted.
    GuardStopped,
}

pub struct Runner {
    monitor: Arc<Monitor>,
    signals: Arc<SignalQueues>,
    locks: Arc<RunLockMap>,
    client: Arc<dyn ObjectGenerator>,
    resources: SharedResources,
}

impl Runner {
    pub fn new(
        monitor: Arc<Monitor>,
        signals: Arc<SignalQueues>,
        locks: Arc<RunLockMap>,
        client: Arc<dyn ObjectGenerator>,
        resources: SharedResources,
    ) -> Self {
        Self { monitor, signals, locks, client, resources }
    }

    fn emit(&self, run_id: &str, body: EventBody) -> Result<Event> {
        let kind = body.kind();
        if is_transition_kind(kind) {
            let current = self
                .monitor
                .get(run_id)
                .map(|r| r.status)
                .unwrap_or(RunState::Idle);
            state_machine::apply_transition(current, kind)?;
        }
        let seq = self.monitor.next_seq(run_id);
        let event = Event::new(run_id.to_string(), seq, body);
        self.monitor.append(event.clone());
        Ok(event)
    }

    /// Start a brand-new run at block 0 (spec §4.F Start).
    pub async fn start(
        &self,
        run_id: &str,
        brain: &Brain,
        options: Value,
        initial_state: Value,
    ) -> Result<()> {
        let _permit = self.locks.acquire(run_id).await;
        self.monitor.register(crate::runtime::monitor::Run::new(
            run_id.to_string(),
            brain.title.clone(),
            options,
            initial_state,
        ));
        self.emit(run_id, EventBody::Start)?;
        let outcome = self.run_blocks(run_id, brain, 0).await?;
        self.finalize(run_id, outcome)
    }

    /// Resume a run after a process restart (spec §4.F.2): re-execute
    /// the last block observed with `STEP_START` but no matching
    /// `STEP_COMPLETE` from scratch — steps must be idempotent.
    pub async fn resume_after_restart(&self, run_id: &str, brain: &Brain) -> Result<()> {
        let _permit = self.locks.acquire(run_id).await;
        let Some(run) = self.monitor.get(run_id) else {
            return Err(Error::RunNotFound(run_id.to_string()));
        };
        if run.status.is_terminal() {
            return Err(Error::RunTerminal(run_id.to_string()));
        }
        self.emit(run_id, EventBody::Restart)?;
        let outcome = self.run_blocks(run_id, brain, run.current_step_index).await?;
        self.finalize(run_id, outcome)
    }

    /// Wake a parked Agent block after its `WEBHOOK_RESPONSE` arrives
    /// (spec §4.F.2): reconstruct its conversation from the event log
    /// and re-enter the sub-loop with the response injected as the
    /// pending tool's result.
    pub async fn resume_after_webhook(&self, run_id: &str, brain: &Brain, response: Value) -> Result<()> {
        let _permit = self.locks.acquire(run_id).await;
        let Some(run) = self.monitor.get(run_id) else {
            return Err(Error::RunNotFound(run_id.to_string()));
        };
        let events = self.monitor.events(run_id, None);
        let resumed = agent_loop::reconstruct(&events, run.current_step_index)?;
        self.emit(run_id, EventBody::WebhookResponse { response: response.clone() })?;

        let Some(Block::Agent { config_fn, .. }) = brain.block(run.current_step_index) else {
            return Err(Error::IrInvalid(format!(
                "resume target block {} is not an agent block",
                run.current_step_index
            )));
        };
        let ctx = StepContext {
            state: run.state.clone(),
            options: run.options.clone(),
            resources: self.resources.clone(),
            response: None,
            page: None,
            env: std::collections::HashMap::new(),
        };
        let config = config_fn(&ctx)?;

        let mut messages = resumed.messages;
        if let Some(pending) = &resumed.pending_tool_call_id {
            messages.push(sa_domain::tool::Message::tool_result(pending, &response.to_string()));
        }

        let deps = AgentLoopDeps { locks: &self.locks, signals: &self.signals, client: self.client.as_ref(), resources: self.resources.clone() };
        let outcome = agent_loop::resume_with_messages(
            &deps,
            run_id,
            run.current_step_index,
            config,
            &run.state,
            &run.options,
            messages,
            |body| self.emit(run_id, body),
        )
        .await?;

        let block_outcome = match outcome {
            AgentBlockOutcome::Done { patch: Some(p)} => {
                self.apply_patch_and_continue(run_id, p);
                BlockOutcome::Continue
            }
            AgentBlockOutcome::Done { patch: None } => BlockOutcome::Continue,
            AgentBlockOutcome::Parked => BlockOutcome::Parked,
            AgentBlockOutcome::Cancelled => BlockOutcome::Cancelled,
        };
        let outcome = match block_outcome {
            BlockOutcome::Continue => self.run_blocks(run_id, brain, run.current_step_index + 1).await?,
            BlockOutcome::Parked => return Ok(()),
            BlockOutcome::Cancelled => return Ok(()),
            BlockOutcome::GuardStopped => unreachable!("agent blocks never guard-stop"),
        };
        self.finalize(run_id, outcome)
    }

    fn apply_patch_and_continue(&self, _run_id: &str, _p: json_patch::Patch) {
        // State is already applied by Monitor::append's STEP_COMPLETE handling.
    }

    fn finalize(&self, run_id: &str, outcome: RunBlocksOutcome) -> Result<()> {
        match outcome {
            RunBlocksOutcome::Finished => {
                self.emit(run_id, EventBody::Complete)?;
            }
            RunBlocksOutcome::Parked | RunBlocksOutcome::Cancelled | RunBlocksOutcome::GuardStopped => {}
        }
        Ok(())
    }

    /// Drive blocks `start_index..` to completion or a park/stop point.
    async fn run_blocks(&self, run_id: &str, brain: &Brain, mut index: usize) -> Result<RunBlocksOutcome> {
        while index < brain.len() {
            for sig in self.signals.drain(run_id, SignalFilter::Control) {
                match sig {
                    Signal::Kill => {
                        self.emit(run_id, EventBody::Cancelled)?;
                        self.signals.clear(run_id);
                        return Ok(RunBlocksOutcome::Cancelled);
                    }
                    Signal::Pause => {
                        self.emit(run_id, EventBody::Paused)?;
                        self.wait_for_resume(run_id).await?;
                        self.emit(run_id, EventBody::Resumed)?;
                    }
                    _ => {}
                }
            }

            let block = brain
                .block(index)
                .ok_or_else(|| Error::IrInvalid(format!("block index {index} out of range")))?;
            let title = block.title().unwrap_or(block.kind_name()).to_string();
            self.emit(run_id, EventBody::StepStart { step_index: index, title })?;

            let state = self.monitor.get(run_id).map(|r| r.state).unwrap_or(Value::Null);
            let options = self.monitor.get(run_id).map(|r| r.options).unwrap_or(Value::Null);

            let outcome = match block {
                Block::Step { action, .. } => {
                    self.execute_step(run_id, index, action, &state, &options).await?
                }
                Block::Agent { config_fn, .. } => {
                    let ctx = StepContext {
                        state: state.clone(),
                        options: options.clone(),
                        resources: self.resources.clone(),
                        response: None,
                        page: None,
                        env: std::collections::HashMap::new(),
                    };
                    let config = config_fn(&ctx)?;
                    let deps = AgentLoopDeps { locks: &self.locks, signals: &self.signals, client: self.client.as_ref(), resources: self.resources.clone() };
                    match agent_loop::run(&deps, run_id, index, config, &state, &options, |body| self.emit(run_id, body)).await? {
                        AgentBlockOutcome::Done { .. } => BlockOutcome::Continue,
                        AgentBlockOutcome::Parked => BlockOutcome::Parked,
                        AgentBlockOutcome::Cancelled => BlockOutcome::Cancelled,
                    }
                }
                Block::BatchPrompt {
                    over,
                    template,
                    schema,
                    schema_name,
                    chunk_size,
                    retry,
                    error_policy,
                    ..
                } => {
                    self.execute_batch_prompt(
                        run_id, index, over, template, schema, schema_name, *chunk_size, retry, error_policy, &state,
                    )
                    .await?
                }
                Block::Guard { predicate } => {
                    if predicate(&state, &options) {
                        self.emit(run_id, EventBody::StepComplete { step_index: index, patch: patch::diff(&state, &state) })?;
                        BlockOutcome::Continue
                    } else {
                        self.emit(run_id, EventBody::Complete)?;
                        BlockOutcome::GuardStopped
                    }
                }
                Block::Wait { action } => {
                    let ctx = StepContext {
                        state: state.clone(),
                        options: options.clone(),
                        resources: self.resources.clone(),
                        response: None,
                        page: None,
                        env: std::collections::HashMap::new(),
                    };
                    let registrations = action(&ctx)?;
                    self.register_waiters(run_id, &registrations);
                    self.emit(run_id, EventBody::Webhook { wait_for: registrations })?;
                    BlockOutcome::Parked
                }
                Block::SubBrain { inner_brain, initial_state, fold } => {
                    let inner_state = initial_state(&state);
                    let inner_brain = inner_brain.clone();
                    let inner_outcome = Box::pin(self.run_blocks(run_id, &inner_brain, 0)).await?;
                    match inner_outcome {
                        RunBlocksOutcome::Finished | RunBlocksOutcome::GuardStopped => {
                            let final_inner_state = self.monitor.get(run_id).map(|r| r.state).unwrap_or(state.clone());
                            let folded = fold(&state, &final_inner_state);
                            let p = patch::diff(&state, &folded);
                            self.emit(run_id, EventBody::StepComplete { step_index: index, patch: p })?;
                            BlockOutcome::Continue
                        }
                        RunBlocksOutcome::Parked => BlockOutcome::Parked,
                        RunBlocksOutcome::Cancelled => BlockOutcome::Cancelled,
                    }
                }
            };

            match outcome {
                BlockOutcome::Continue => index += 1,
                BlockOutcome::Parked => return Ok(RunBlocksOutcome::Parked),
                BlockOutcome::Cancelled => return Ok(RunBlocksOutcome::Cancelled),
                BlockOutcome::GuardStopped => return Ok(RunBlocksOutcome::GuardStopped),
            }
        }
        Ok(RunBlocksOutcome::Finished)
    }

    async fn execute_step(
        &self,
        run_id: &str,
        index: usize,
        action: &StepAction,
        state: &Value,
        options: &Value,
    ) -> Result<BlockOutcome> {
        let policy = RetryPolicy::default();
        let ctx = StepContext {
            state: state.clone(),
            options: options.clone(),
            resources: self.resources.clone(),
            response: None,
            page: None,
            env: std::collections::HashMap::new(),
        };
        let mut attempt = 0u32;
        loop {
            match action(&ctx) {
                Ok(StepOutcome::State(new_state)) => {
                    let p = patch::diff(state, &new_state);
                    self.emit(run_id, EventBody::StepComplete { step_index: index, patch: p })?;
                    return Ok(BlockOutcome::Continue);
                }
                Ok(StepOutcome::StateWithPrompt { state: new_state, .. }) => {
                    let p = patch::diff(state, &new_state);
                    self.emit(run_id, EventBody::StepComplete { step_index: index, patch: p })?;
                    return Ok(BlockOutcome::Continue);
                }
                Ok(StepOutcome::WaitFor(registrations)) => {
                    self.register_waiters(run_id, &registrations);
                    self.emit(run_id, EventBody::Webhook { wait_for: registrations })?;
                    return Ok(BlockOutcome::Parked);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        self.emit(run_id, EventBody::Error { error: SerializedError::from(&e) })?;
                        return Err(e);
                    }
                    self.emit(run_id, EventBody::StepRetry { step_index: index, error: SerializedError::from(&e), attempt })?;
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_batch_prompt(
        &self,
        run_id: &str,
        index: usize,
        over: &sa_domain::brain::BatchOverFn,
        template: &str,
        schema: &Value,
        schema_name: &str,
        chunk_size: usize,
        retry: &RetryPolicy,
        error_policy: &ErrorPolicy,
        state: &Value,
    ) -> Result<BlockOutcome> {
        let items = over(state)?;
        let chunk_size = chunk_size.max(1);
        let mut results: Vec<Value> = Vec::with_capacity(items.len());

        for chunk in items.chunks(chunk_size) {
            let futs = chunk.iter().map(|item| {
                self.run_batch_item(run_id, index, item, template, schema, schema_name, retry, error_policy)
            });
            let chunk_results = futures_util::future::join_all(futs).await;
            for r in chunk_results {
                if let Some(value) = r? {
                    results.push(value);
                }
            }
        }

        let mut new_state = state.clone();
        match &mut new_state {
            Value::Object(map) => {
                map.insert(schema_name.to_string(), Value::Array(results));
            }
            _ => new_state = serde_json::json!({ schema_name: results }),
        }
        let p = patch::diff(state, &new_state);
        self.emit(run_id, EventBody::StepComplete { step_index: index, patch: p })?;
        Ok(BlockOutcome::Continue)
    }

    /// Run one `BatchPrompt` item through `generateObject` with retry,
    /// applying `error_policy` on exhaustion. `Ok(None)` means the item
    /// was dropped (`ErrorPolicy::Skip`). Mirrors `execute_step`'s
    /// retry/error-emission pattern so a `BatchPrompt` run never goes
    /// non-terminal silently (spec §7).
    #[allow(clippy::too_many_arguments)]
    async fn run_batch_item(
        &self,
        run_id: &str,
        index: usize,
        item: &Value,
        template: &str,
        schema: &Value,
        schema_name: &str,
        retry: &RetryPolicy,
        error_policy: &ErrorPolicy,
    ) -> Result<Option<Value>> {
        let prompt = template.replace("{{item}}", &item.to_string());
        let mut attempt = 0u32;
        loop {
            let req = super::client::GenerateObjectRequest {
                schema: schema.clone(),
                schema_name: schema_name.to_string(),
                schema_description: None,
                prompt: Some(prompt.clone()),
                messages: None,
                system: None,
                max_retries: 0,
            };
            match self.client.generate_object(req).await {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    attempt += 1;
                    if attempt >= retry.max_attempts {
                        return match error_policy {
                            ErrorPolicy::Skip => Ok(None),
                            ErrorPolicy::Null => Ok(Some(Value::Null)),
                            ErrorPolicy::Abort => {
                                self.emit(run_id, EventBody::Error { error: SerializedError::from(&e) })?;
                                Err(e)
                            }
                            ErrorPolicy::Custom(f) => Ok(Some(f(item, &e))),
                        };
                    }
                    self.emit(run_id, EventBody::StepRetry { step_index: index, error: SerializedError::from(&e), attempt })?;
                    tokio::time::sleep(retry.delay_for(attempt)).await;
                }
            }
        }
    }

    fn register_waiters(&self, run_id: &str, registrations: &[WebhookRegistration]) {
        for reg in registrations {
            self.monitor.register_waiter(
                reg.slug.clone(),
                reg.identifier.clone(),
                Waiter {
                    run_id: run_id.to_string(),
                    expected_token: reg.expected_token.clone(),
                    created_at: chrono::Utc::now(),
                },
            );
        }
    }

    async fn wait_for_resume(&self, run_id: &str) -> Result<()> {
        loop {
            for sig in self.signals.drain(run_id, SignalFilter::All) {
                match sig {
                    Signal::Resume => return Ok(()),
                    Signal::Kill => return Err(Error::Other("cancelled while paused".into())),
                    other => self.signals.enqueue(run_id, other),
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}

enum RunBlocksOutcome {
    Finished,
    Parked,
    Cancelled,
    GuardStopped,
}

/// Adapts the Runner to the Scheduler's `RunStarter` seam (spec §4.H):
/// a schedule fire just starts a fresh run at block 0 with empty state.
pub struct RunnerStarter {
    pub runner: Arc<Runner>,
    pub manifest: Arc<dyn super::manifest::BrainManifest>,
}

#[async_trait::async_trait]
impl RunStarter for RunnerStarter {
    async fn start_run(&self, brain_title: &str, run_id: &str) -> std::result::Result<(), String> {
        let brain = self
            .manifest
            .resolve(brain_title)
            .ok_or_else(|| format!("unknown brain: {brain_title}"))?;
        self.runner
            .start(run_id, &brain, Value::Null, Value::Null)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::brain::BatchOverFn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct NoopClient;
    #[async_trait::async_trait]
    impl ObjectGenerator for NoopClient {
        async fn generate_text(&self, _req: super::super::client::GenerateTextRequest) -> Result<super::super::client::GenerateTextResult> {
            Ok(super::super::client::GenerateTextResult { text: None, tool_calls: Vec::new(), total_tokens: 0 })
        }
        async fn generate_object(&self, _req: super::super::client::GenerateObjectRequest) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn new_runner() -> (Runner, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let monitor = Arc::new(Monitor::new(dir.path(), 100, 16));
        let signals = Arc::new(SignalQueues::new());
        let locks = Arc::new(RunLockMap::new());
        let client: Arc<dyn ObjectGenerator> = Arc::new(NoopClient);
        let resources: sa_domain::brain::SharedResources = Arc::new(sa_domain::brain::EmptyResources);
        (Runner::new(monitor, signals, locks, client, resources), dir)
    }

    #[tokio::test]
    async fn single_step_brain_completes() {
        let (runner, _dir) = new_runner();
        let brain = Brain::new(
            "greet",
            vec![Block::Step {
                title: "say hi".into(),
                action: Arc::new(|ctx| {
                    let mut s = ctx.state.clone();
                    s["greeted"] = Value::Bool(true);
                    Ok(StepOutcome::State(s))
                }),
            }],
        );
        runner.start("run_1", &brain, Value::Null, serde_json::json!({})).await.unwrap();
        let run = runner.monitor.get("run_1").unwrap();
        assert_eq!(run.status, RunState::Complete);
        assert_eq!(run.state, serde_json::json!({"greeted": true}));
    }

    #[tokio::test]
    async fn failing_step_retries_then_errors() {
        let (runner, _dir) = new_runner();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let brain = Brain::new(
            "boom",
            vec![Block::Step {
                title: "fail".into(),
                action: Arc::new(move |_ctx| {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Other("boom".into()))
                }),
            }],
        );
        let err = runner.start("run_2", &brain, Value::Null, Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1); // default max_attempts = 1
        let run = runner.monitor.get("run_2").unwrap();
        assert_eq!(run.status, RunState::Error);
    }

    #[tokio::test]
    async fn guard_false_completes_run_early() {
        let (runner, _dir) = new_runner();
        let brain = Brain::new(
            "gate",
            vec![
                Block::Guard { predicate: Arc::new(|_, _| false) },
                Block::Step {
                    title: "unreachable".into(),
                    action: Arc::new(|ctx| Ok(StepOutcome::State(ctx.state.clone()))),
                },
            ],
        );
        runner.start("run_3", &brain, Value::Null, Value::Null).await.unwrap();
        let run = runner.monitor.get("run_3").unwrap();
        assert_eq!(run.status, RunState::Complete);
        let events = runner.monitor.events("run_3", None);
        assert_eq!(events.iter().filter(|e| matches!(e.body, EventBody::StepStart { .. })).count(), 1);
    }

    #[tokio::test]
    async fn wait_block_parks_run_as_waiting() {
        let (runner, _dir) = new_runner();
        let brain = Brain::new(
            "pause-for-webhook",
            vec![Block::Wait {
                action: Arc::new(|_ctx| {
                    Ok(vec![WebhookRegistration { slug: "s".into(), identifier: "i".into(), expected_token: None }])
                }),
            }],
        );
        runner.start("run_4", &brain, Value::Null, Value::Null).await.unwrap();
        let run = runner.monitor.get("run_4").unwrap();
        assert_eq!(run.status, RunState::Waiting);
    }

    #[tokio::test]
    async fn kill_signal_cancels_before_next_block() {
        let (runner, _dir) = new_runner();
        runner.signals.enqueue("run_5", Signal::Kill);
        let brain = Brain::new(
            "never-runs",
            vec![Block::Step {
                title: "unreachable".into(),
                action: Arc::new(|ctx| Ok(StepOutcome::State(ctx.state.clone()))),
            }],
        );
        runner.start("run_5", &brain, Value::Null, Value::Null).await.unwrap();
        let run = runner.monitor.get("run_5").unwrap();
        assert_eq!(run.status, RunState::Cancelled);
    }

    #[tokio::test]
    async fn sub_brain_folds_inner_state_into_outer() {
        let (runner, _dir) = new_runner();
        let inner = Arc::new(Brain::new(
            "inner",
            vec![Block::Step {
                title: "inner step".into(),
                action: Arc::new(|ctx| {
                    let mut s = ctx.state.clone();
                    s["inner_done"] = Value::Bool(true);
                    Ok(StepOutcome::State(s))
                }),
            }],
        ));
        let brain = Brain::new(
            "outer",
            vec![Block::SubBrain {
                inner_brain: inner,
                initial_state: Arc::new(|outer| outer.clone()),
                fold: Arc::new(|outer, inner| {
                    let mut merged = outer.clone();
                    if let (Value::Object(o), Value::Object(i)) = (&mut merged, inner) {
                        for (k, v) in i {
                            o.insert(k.clone(), v.clone());
                        }
                    }
                    merged
                }),
            }],
        );
        runner.start("run_6", &brain, Value::Null, serde_json::json!({})).await.unwrap();
        let run = runner.monitor.get("run_6").unwrap();
        assert_eq!(run.status, RunState::Complete);
        assert_eq!(run.state, serde_json::json!({"inner_done": true}));
    }

    #[tokio::test]
    async fn batch_prompt_merges_results_under_schema_name() {
        let (runner, _dir) = new_runner();
        struct EchoClient;
        #[async_trait::async_trait]
        impl ObjectGenerator for EchoClient {
            async fn generate_text(&self, _req: super::super::client::GenerateTextRequest) -> Result<super::super::client::GenerateTextResult> {
                Ok(super::super::client::GenerateTextResult { text: None, tool_calls: Vec::new(), total_tokens: 0 })
            }
            async fn generate_object(&self, req: super::super::client::GenerateObjectRequest) -> Result<Value> {
                Ok(serde_json::json!({"echo": req.prompt}))
            }
        }
        let monitor = Arc::new(Monitor::new(_dir.path(), 100, 16));
        let signals = Arc::new(SignalQueues::new());
        let locks = Arc::new(RunLockMap::new());
        let client: Arc<dyn ObjectGenerator> = Arc::new(EchoClient);
        let resources: sa_domain::brain::SharedResources = Arc::new(sa_domain::brain::EmptyResources);
        let runner = Runner::new(monitor, signals, locks, client, resources);

        let over: BatchOverFn = Arc::new(|state| {
            Ok(state["items"].as_array().cloned().unwrap_or_default())
        });
        let brain = Brain::new(
            "batch",
            vec![Block::BatchPrompt {
                title: "summarize".into(),
                over,
                template: "summarize {{item}}".into(),
                schema: serde_json::json!({"type": "object"}),
                schema_name: "summaries".into(),
                chunk_size: 2,
                retry: RetryPolicy::default(),
                error_policy: ErrorPolicy::Skip,
            }],
        );
        runner
            .start("run_7", &brain, Value::Null, serde_json::json!({"items": ["a", "b"]}))
            .await
            .unwrap();
        let run = runner.monitor.get("run_7").unwrap();
        assert_eq!(run.status, RunState::Complete);
        assert_eq!(run.state["summaries"].as_array().unwrap().len(), 2);
    }
}
