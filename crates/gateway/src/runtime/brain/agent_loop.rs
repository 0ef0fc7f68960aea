//! Agent sub-loop (spec §4.F.1) and resume discipline (§4.F.2).
//!
//! Runs inside a single `Agent` block: drives `generateText` against an
//! accumulating conversation until a terminal tool call, a no-tool-call
//! response, or a park (webhook wait / token limit).

use std::sync::Arc;

use sa_domain::brain::{AgentConfig, AgentTool, RetryPolicy, SharedResources, StepContext, ToolOutcome};
use sa_domain::error::{Error, Result};
use sa_domain::event::{Event, EventBody, SerializedError, WebhookRegistration};
use sa_domain::patch;
use sa_domain::signal::{Signal, SignalFilter};
use sa_domain::tool::{Message, ToolDefinition};
use serde_json::Value;

use super::client::{GenerateTextRequest, ObjectGenerator};
use crate::runtime::run_lock::RunLockMap;
use crate::runtime::signals::SignalQueues;

/// Name of the terminal tool auto-injected when a config defines none
/// (spec §4.F.1: "tool set T (with auto-injected `done`)").
const DONE_TOOL_NAME: &str = "done";

pub fn ensure_done_tool(mut tools: Vec<AgentTool>) -> Vec<AgentTool> {
    if !tools.iter().any(|t| t.terminal) {
        tools.push(AgentTool {
            name: DONE_TOOL_NAME.to_string(),
            description: "Signal that the agent has finished its task.".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
            terminal: true,
            execute: Arc::new(|_input, _ctx| Ok(ToolOutcome::Value(Value::Null))),
        });
    }
    tools
}

/// What happened when the block finished executing, mirrored by the
/// runner's own `BlockOutcome` (kept separate to avoid a dependency
/// cycle between the two modules).
pub enum AgentBlockOutcome {
    /// The agent loop ran to a close (terminal tool, no tool calls, or
    /// token limit) — `patch` is `None` when no state change resulted.
    Done { patch: Option<json_patch::Patch> },
    Parked,
    Cancelled,
}

pub struct AgentLoopDeps<'a> {
    pub locks: &'a RunLockMap,
    pub signals: &'a SignalQueues,
    pub client: &'a dyn ObjectGenerator,
    pub resources: SharedResources,
}

/// Drive the agent sub-loop for `step_index`, appending events via
/// `emit` (shared with the runner so `seq`/transition validation stays
/// centralized there).
#[allow(clippy::too_many_arguments)]
pub async fn run<F>(
    deps: &AgentLoopDeps<'_>,
    run_id: &str,
    step_index: usize,
    config: AgentConfig,
    state: &Value,
    options: &Value,
    mut emit: F,
) -> Result<AgentBlockOutcome>
where
    F: FnMut(EventBody) -> Result<Event>,
{
    let prompt = config.prompt.clone().unwrap_or_else(|| "Begin.".to_string());
    emit(EventBody::AgentStart {
        step_index,
        prompt: prompt.clone(),
        system: config.system.clone(),
    })?;
    let messages = vec![Message::user(prompt)];
    drive_iterations(deps, run_id, step_index, config, state, options, messages, emit).await
}

/// Re-enter the sub-loop after a restart with a conversation already
/// reconstructed from the event log (spec §4.F.2) — no `AGENT_START`
/// is re-emitted since the original one is still in the log.
#[allow(clippy::too_many_arguments)]
pub async fn resume_with_messages<F>(
    deps: &AgentLoopDeps<'_>,
    run_id: &str,
    step_index: usize,
    config: AgentConfig,
    state: &Value,
    options: &Value,
    messages: Vec<Message>,
    emit: F,
) -> Result<AgentBlockOutcome>
where
    F: FnMut(EventBody) -> Result<Event>,
{
    drive_iterations(deps, run_id, step_index, config, state, options, messages, emit).await
}

#[allow(clippy::too_many_arguments)]
async fn drive_iterations<F>(
    deps: &AgentLoopDeps<'_>,
    run_id: &str,
    step_index: usize,
    config: AgentConfig,
    state: &Value,
    options: &Value,
    mut messages: Vec<Message>,
    mut emit: F,
) -> Result<AgentBlockOutcome>
where
    F: FnMut(EventBody) -> Result<Event>,
{
    let tools = ensure_done_tool(config.tools);
    let tool_defs: Vec<ToolDefinition> = tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.input_schema.clone(),
        })
        .collect();

    let mut total_tokens: u64 = 0;
    let max_iterations = config.max_iterations.max(1);

    for i in 0..max_iterations {
        // Step 1: drain CONTROL signals.
        for sig in deps.signals.drain(run_id, SignalFilter::Control) {
            match sig {
                Signal::Kill => {
                    emit(EventBody::Cancelled)?;
                    return Ok(AgentBlockOutcome::Cancelled);
                }
                Signal::Pause => {
                    emit(EventBody::Paused)?;
                    wait_for_resume(deps, run_id).await?;
                    emit(EventBody::Resumed)?;
                }
                _ => {}
            }
        }

        // Step 2: drain ALL signals; USER_MESSAGE joins the conversation.
        for sig in deps.signals.drain(run_id, SignalFilter::All) {
            if let Signal::UserMessage { content } = sig {
                messages.push(Message::user(content.clone()));
                emit(EventBody::AgentUserMessage { content })?;
            }
        }

        // Step 3: generateText, accumulating usage. Retries on failure
        // the same way a Step action does (spec §4.F.3) so a provider
        // hiccup doesn't leave the run stuck at a non-terminal status.
        let policy = RetryPolicy::default();
        let mut attempt = 0u32;
        let resp = loop {
            match deps
                .client
                .generate_text(GenerateTextRequest {
                    system: config.system.clone(),
                    messages: messages.clone(),
                    tools: tool_defs.clone(),
                })
                .await
            {
                Ok(resp) => break resp,
                Err(e) => {
                    attempt += 1;
                    if attempt >= policy.max_attempts {
                        emit(EventBody::Error { error: SerializedError::from(&e) })?;
                        return Err(e);
                    }
                    emit(EventBody::StepRetry { step_index, error: SerializedError::from(&e), attempt })?;
                    tokio::time::sleep(policy.delay_for(attempt)).await;
                }
            }
        };
        total_tokens = total_tokens.saturating_add(resp.total_tokens);
        if let Some(max_tokens) = config.max_tokens {
            if total_tokens > max_tokens {
                emit(EventBody::AgentTokenLimit { total_tokens, max_tokens })?;
                return Ok(AgentBlockOutcome::Done { patch: None });
            }
        }

        // Step 4: assistant text.
        if let Some(text) = &resp.text {
            if !text.is_empty() {
                messages.push(Message::assistant(text.clone()));
                emit(EventBody::AgentAssistantMessage { content: text.clone() })?;
            }
        }

        if resp.tool_calls.is_empty() {
            // Step 6: no tool calls — close the block, no AGENT_COMPLETE.
            emit(EventBody::StepComplete {
                step_index,
                patch: patch::diff(state, state),
            })?;
            return Ok(AgentBlockOutcome::Done { patch: None });
        }

        // Step 5: dispatch each tool call in order.
        for call in &resp.tool_calls {
            emit(EventBody::AgentToolCall {
                tool_call_id: call.call_id.clone(),
                name: call.tool_name.clone(),
                input: call.arguments.clone(),
            })?;

            let Some(tool) = tools.iter().find(|t| t.name == call.tool_name) else {
                let err = Error::UnknownTool(call.tool_name.clone());
                emit(EventBody::Error { error: SerializedError::from(&err) })?;
                return Err(err);
            };

            if tool.terminal {
                emit(EventBody::AgentComplete {
                    terminal_tool: tool.name.clone(),
                    result: call.arguments.clone(),
                    iterations: i,
                })?;
                let new_state = merge_output(state, &call.arguments, config.output_schema.as_ref());
                let p = patch::diff(state, &new_state);
                emit(EventBody::StepComplete { step_index, patch: p.clone() })?;
                return Ok(AgentBlockOutcome::Done { patch: Some(p) });
            }

            let ctx = StepContext {
                state: state.clone(),
                options: options.clone(),
                resources: deps.resources.clone(),
                response: None,
                page: None,
                env: std::collections::HashMap::new(),
            };
            match (tool.execute)(&call.arguments, &ctx) {
                Ok(ToolOutcome::Value(value)) => {
                    emit(EventBody::AgentToolResult {
                        tool_call_id: call.call_id.clone(),
                        name: tool.name.clone(),
                        result: value.clone(),
                    })?;
                    messages.push(Message::tool_result(&call.call_id, &value.to_string()));
                }
                Ok(ToolOutcome::WaitFor(registrations)) => {
                    emit(EventBody::AgentWebhook {
                        tool_call_id: call.call_id.clone(),
                        name: tool.name.clone(),
                        input: call.arguments.clone(),
                    })?;
                    emit(EventBody::Webhook { wait_for: registrations })?;
                    return Ok(AgentBlockOutcome::Parked);
                }
                Err(e) => {
                    emit(EventBody::Error { error: SerializedError::from(&e) })?;
                    return Err(e);
                }
            }
        }
    }

    // Iteration budget exhausted without a terminal tool or empty response.
    emit(EventBody::StepComplete {
        step_index,
        patch: patch::diff(state, state),
    })?;
    Ok(AgentBlockOutcome::Done { patch: None })
}

fn merge_output(state: &Value, tool_input: &Value, schema: Option<&sa_domain::brain::OutputSchema>) -> Value {
    match schema {
        Some(s) => {
            let mut next = state.clone();
            if let Value::Object(map) = &mut next {
                map.insert(s.name.clone(), tool_input.clone());
            } else {
                next = serde_json::json!({ s.name.clone(): tool_input.clone() });
            }
            next
        }
        None => tool_input.clone(),
    }
}

async fn wait_for_resume(deps: &AgentLoopDeps<'_>, run_id: &str) -> Result<()> {
    loop {
        for sig in deps.signals.drain(run_id, SignalFilter::All) {
            match sig {
                Signal::Resume => return Ok(()),
                Signal::Kill => return Err(Error::Other("cancelled while paused".into())),
                other => deps.signals.enqueue(run_id, other),
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
}

// ── Resume discipline (spec §4.F.2) ─────────────────────────────────

/// Reconstructed agent conversation plus an optional pending tool call
/// awaiting its webhook response.
pub struct ResumeState {
    pub messages: Vec<Message>,
    pub pending_tool_call_id: Option<String>,
}

/// Rebuild `M` by replaying events from the last `AGENT_START` of
/// `step_index` forward. Returns `Err` if an `AGENT_WEBHOOK` exists
/// with no matching preceding `AGENT_START` (corrupt log, spec §4.F.2).
pub fn reconstruct(events: &[Event], step_index: usize) -> Result<ResumeState> {
    let start_pos = events.iter().rposition(|e| {
        matches!(&e.body, EventBody::AgentStart { step_index: si, .. } if *si == step_index)
    });

    let Some(start_pos) = start_pos else {
        let has_webhook = events
            .iter()
            .any(|e| matches!(e.body, EventBody::AgentWebhook { .. }));
        if has_webhook {
            return Err(Error::Other("corrupt log: AGENT_WEBHOOK without AGENT_START".into()));
        }
        return Ok(ResumeState { messages: Vec::new(), pending_tool_call_id: None });
    };

    let EventBody::AgentStart { prompt, .. } = &events[start_pos].body else {
        unreachable!()
    };
    let mut messages = vec![Message::user(prompt.clone())];
    let mut pending_tool_call_id = None;

    for e in &events[start_pos + 1..] {
        match &e.body {
            EventBody::AgentAssistantMessage { content } => {
                messages.push(Message::assistant(content.clone()));
                pending_tool_call_id = None;
            }
            EventBody::AgentUserMessage { content } => {
                messages.push(Message::user(content.clone()));
            }
            EventBody::AgentToolResult { tool_call_id, result, .. } => {
                messages.push(Message::tool_result(tool_call_id, &result.to_string()));
                pending_tool_call_id = None;
            }
            EventBody::AgentWebhook { tool_call_id, .. } => {
                pending_tool_call_id = Some(tool_call_id.clone());
            }
            _ => {}
        }
    }

    Ok(ResumeState { messages, pending_tool_call_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_done_tool_injects_when_missing() {
        let tools = ensure_done_tool(Vec::new());
        assert_eq!(tools.len(), 1);
        assert!(tools[0].terminal);
        assert_eq!(tools[0].name, "done");
    }

    #[test]
    fn ensure_done_tool_respects_existing_terminal() {
        let tools = vec![AgentTool {
            name: "finish".into(),
            description: "".into(),
            input_schema: serde_json::json!({}),
            terminal: true,
            execute: Arc::new(|_, _| Ok(ToolOutcome::Value(Value::Null))),
        }];
        let tools = ensure_done_tool(tools);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "finish");
    }

    #[test]
    fn reconstruct_empty_when_no_agent_start() {
        let events: Vec<Event> = vec![Event::new("r1", 0, EventBody::Start)];
        let r = reconstruct(&events, 0).unwrap();
        assert!(r.messages.is_empty());
        assert!(r.pending_tool_call_id.is_none());
    }

    #[test]
    fn reconstruct_rebuilds_conversation() {
        let events = vec![
            Event::new("r1", 0, EventBody::AgentStart { step_index: 0, prompt: "Begin.".into(), system: None }),
            Event::new("r1", 1, EventBody::AgentAssistantMessage { content: "thinking".into() }),
            Event::new("r1", 2, EventBody::AgentToolCall { tool_call_id: "c1".into(), name: "search".into(), input: serde_json::json!({}) }),
            Event::new("r1", 3, EventBody::AgentToolResult { tool_call_id: "c1".into(), name: "search".into(), result: serde_json::json!({"x": 1}) }),
        ];
        let r = reconstruct(&events, 0).unwrap();
        assert_eq!(r.messages.len(), 3); // user prompt, assistant, tool result
        assert!(r.pending_tool_call_id.is_none());
    }

    #[test]
    fn reconstruct_detects_pending_webhook() {
        let events = vec![
            Event::new("r1", 0, EventBody::AgentStart { step_index: 0, prompt: "Begin.".into(), system: None }),
            Event::new("r1", 1, EventBody::AgentWebhook { tool_call_id: "c1".into(), name: "notify".into(), input: serde_json::json!({}) }),
        ];
        let r = reconstruct(&events, 0).unwrap();
        assert_eq!(r.pending_tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn reconstruct_rejects_orphan_webhook() {
        let events = vec![Event::new("r1", 0, EventBody::AgentWebhook {
            tool_call_id: "c1".into(),
            name: "notify".into(),
            input: serde_json::json!({}),
        })];
        assert!(reconstruct(&events, 0).is_err());
    }

    #[test]
    fn merge_output_under_schema_name() {
        let schema = sa_domain::brain::OutputSchema { name: "result".into(), schema: serde_json::json!({}) };
        let merged = merge_output(&serde_json::json!({"a": 1}), &serde_json::json!({"b": 2}), Some(&schema));
        assert_eq!(merged, serde_json::json!({"a": 1, "result": {"b": 2}}));
    }

    #[test]
    fn merge_output_without_schema_replaces_root() {
        let merged = merge_output(&serde_json::json!({"a": 1}), &serde_json::json!({"b": 2}), None);
        assert_eq!(merged, serde_json::json!({"b": 2}));
    }
}
