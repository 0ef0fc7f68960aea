//! The append-only `Event` log record (spec §3, §4.D).
//!
//! Events are totally ordered within a run by strictly increasing
//! `seq` (spec P2). `EventKind` is the closed variant set every
//! transition in [`crate::state_machine`] is keyed on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A serialized error blob, safe to embed in events / HTTP bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedError {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl From<&Error> for SerializedError {
    fn from(e: &Error) -> Self {
        Self {
            name: variant_name(e).to_string(),
            message: e.to_string(),
            stack: None,
        }
    }
}

fn variant_name(e: &Error) -> &'static str {
    match e {
        Error::Io(_) => "Io",
        Error::Json(_) => "Json",
        Error::Http(_) => "Http",
        Error::Timeout(_) => "Timeout",
        Error::Provider { .. } => "Provider",
        Error::SkillNotFound(_) => "SkillNotFound",
        Error::Config(_) => "Config",
        Error::Auth(_) => "Auth",
        Error::BadPatch(_) => "ErrBadPatch",
        Error::IrInvalid(_) => "ErrIRInvalid",
        Error::UnknownBrain(_) => "ErrUnknownBrain",
        Error::UnknownTool(_) => "ErrUnknownTool",
        Error::TokenLimit { .. } => "ErrTokenLimit",
        Error::TransitionDenied { .. } => "ErrTransitionDenied",
        Error::RunNotFound(_) => "ErrRunNotFound",
        Error::RunTerminal(_) => "ErrRunTerminal",
        Error::WaiterNotFound { .. } => "ErrWaiterNotFound",
        Error::CsrfMismatch => "ErrCsrfMismatch",
        Error::Upstream { .. } => "ErrUpstream",
        Error::Other(_) => "Other",
    }
}

/// A webhook wait registration, as requested by a `Step`'s `waitFor`
/// result, a `Wait` block, or `AGENT_WEBHOOK`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub slug: String,
    pub identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_token: Option<String>,
}

/// The discriminant of an [`Event`] — used both to tag the JSON wire
/// format and as the input to [`crate::state_machine::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Start,
    Restart,
    StepStatus,
    StepStart,
    StepComplete,
    StepRetry,
    AgentStart,
    AgentIteration,
    AgentToolCall,
    AgentToolResult,
    AgentAssistantMessage,
    AgentUserMessage,
    AgentComplete,
    AgentTokenLimit,
    AgentWebhook,
    Webhook,
    WebhookResponse,
    Paused,
    Resumed,
    Cancelled,
    Error,
    Complete,
}

/// The closed event variant set (spec §3). Each carries its own
/// variant-specific fields; the common envelope (`seq`, `ts`, `run_id`)
/// lives on [`Event`], not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventBody {
    #[serde(rename = "START")]
    Start,
    #[serde(rename = "RESTART")]
    Restart,
    #[serde(rename = "STEP_STATUS")]
    StepStatus { step_index: usize, status: String },
    #[serde(rename = "STEP_START")]
    StepStart { step_index: usize, title: String },
    #[serde(rename = "STEP_COMPLETE")]
    StepComplete {
        step_index: usize,
        patch: json_patch::Patch,
    },
    #[serde(rename = "STEP_RETRY")]
    StepRetry {
        step_index: usize,
        error: SerializedError,
        attempt: u32,
    },
    #[serde(rename = "AGENT_START")]
    AgentStart {
        step_index: usize,
        prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<String>,
    },
    #[serde(rename = "AGENT_ITERATION")]
    AgentIteration { n: u32 },
    #[serde(rename = "AGENT_TOOL_CALL")]
    AgentToolCall {
        tool_call_id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "AGENT_TOOL_RESULT")]
    AgentToolResult {
        tool_call_id: String,
        name: String,
        result: serde_json::Value,
    },
    #[serde(rename = "AGENT_ASSISTANT_MESSAGE")]
    AgentAssistantMessage { content: String },
    #[serde(rename = "AGENT_USER_MESSAGE")]
    AgentUserMessage { content: String },
    #[serde(rename = "AGENT_COMPLETE")]
    AgentComplete {
        terminal_tool: String,
        result: serde_json::Value,
        iterations: u32,
    },
    #[serde(rename = "AGENT_TOKEN_LIMIT")]
    AgentTokenLimit { total_tokens: u64, max_tokens: u64 },
    #[serde(rename = "AGENT_WEBHOOK")]
    AgentWebhook {
        tool_call_id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "WEBHOOK")]
    Webhook { wait_for: Vec<WebhookRegistration> },
    #[serde(rename = "WEBHOOK_RESPONSE")]
    WebhookResponse { response: serde_json::Value },
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "RESUMED")]
    Resumed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
    #[serde(rename = "ERROR")]
    Error { error: SerializedError },
    #[serde(rename = "COMPLETE")]
    Complete,
}

impl EventBody {
    pub fn kind(&self) -> EventKind {
        match self {
            EventBody::Start => EventKind::Start,
            EventBody::Restart => EventKind::Restart,
            EventBody::StepStatus { .. } => EventKind::StepStatus,
            EventBody::StepStart { .. } => EventKind::StepStart,
            EventBody::StepComplete { .. } => EventKind::StepComplete,
            EventBody::StepRetry { .. } => EventKind::StepRetry,
            EventBody::AgentStart { .. } => EventKind::AgentStart,
            EventBody::AgentIteration { .. } => EventKind::AgentIteration,
            EventBody::AgentToolCall { .. } => EventKind::AgentToolCall,
            EventBody::AgentToolResult { .. } => EventKind::AgentToolResult,
            EventBody::AgentAssistantMessage { .. } => EventKind::AgentAssistantMessage,
            EventBody::AgentUserMessage { .. } => EventKind::AgentUserMessage,
            EventBody::AgentComplete { .. } => EventKind::AgentComplete,
            EventBody::AgentTokenLimit { .. } => EventKind::AgentTokenLimit,
            EventBody::AgentWebhook { .. } => EventKind::AgentWebhook,
            EventBody::Webhook { .. } => EventKind::Webhook,
            EventBody::WebhookResponse { .. } => EventKind::WebhookResponse,
            EventBody::Paused => EventKind::Paused,
            EventBody::Resumed => EventKind::Resumed,
            EventBody::Cancelled => EventKind::Cancelled,
            EventBody::Error { .. } => EventKind::Error,
            EventBody::Complete => EventKind::Complete,
        }
    }

    /// `true` for the three terminal event kinds (spec I-5: a
    /// terminal event stream ends with exactly one of these).
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventBody::Complete | EventBody::Error { .. } | EventBody::Cancelled)
    }
}

/// One row of the per-run append-only log. Primary key `(run_id, seq)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub run_id: String,
    pub seq: u64,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub body: EventBody,
}

impl Event {
    pub fn new(run_id: impl Into<String>, seq: u64, body: EventBody) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            ts: Utc::now(),
            body,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.body.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_body_kind_matches_variant() {
        assert_eq!(EventBody::Start.kind(), EventKind::Start);
        assert_eq!(EventBody::Complete.kind(), EventKind::Complete);
        assert_eq!(
            EventBody::Paused.kind(),
            EventKind::Paused
        );
    }

    #[test]
    fn terminal_events() {
        assert!(EventBody::Complete.is_terminal());
        assert!(EventBody::Cancelled.is_terminal());
        assert!(EventBody::Error {
            error: SerializedError {
                name: "X".into(),
                message: "y".into(),
                stack: None
            }
        }
        .is_terminal());
        assert!(!EventBody::Start.is_terminal());
        assert!(!EventBody::StepStart {
            step_index: 0,
            title: "a".into()
        }
        .is_terminal());
    }

    #[test]
    fn serialize_event_is_tagged_and_flattened() {
        let ev = Event::new("run-1", 3, EventBody::StepStart { step_index: 0, title: "A".into() });
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "STEP_START");
        assert_eq!(v["run_id"], "run-1");
        assert_eq!(v["seq"], 3);
        assert_eq!(v["step_index"], 0);
    }

    #[test]
    fn serialized_error_from_bad_patch() {
        let e = Error::BadPatch("bad path".into());
        let se: SerializedError = (&e).into();
        assert_eq!(se.name, "ErrBadPatch");
        assert!(se.message.contains("bad path"));
    }
}
