//! The run state machine (spec §4.C).
//!
//! A plain transition map — the same one a UI-side state machine would
//! mirror for rendering, re-implemented once here, server-side, as the
//! single source of truth (spec §9 design note on the Robot3 UI state
//! machine).

use serde::{Deserialize, Serialize};

use crate::event::EventKind;
use crate::signal::Signal;

/// Internal run state. `AgentLoop` projects to the public `Running`
/// status — callers that only care about the externally visible status
/// should go through [`RunState::public_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    AgentLoop,
    Paused,
    Waiting,
    Complete,
    Cancelled,
    Error,
}

impl RunState {
    /// The externally visible status, projecting `AgentLoop -> Running`.
    pub fn public_status(self) -> RunState {
        match self {
            RunState::AgentLoop => RunState::Running,
            other => other,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Cancelled | RunState::Error)
    }
}

/// Returns `true` if `event` may be emitted while the run is in `from`.
///
/// This is the literal transition table from spec §4.C:
/// ```text
/// START|RESTART        idle            -> running
/// STEP_START           running         -> running
/// AGENT_START          running         -> agentLoop
/// AGENT_COMPLETE       agentLoop       -> running
/// WEBHOOK              running|agentLoop -> waiting
/// WEBHOOK_RESPONSE     waiting|running -> running
/// PAUSED               running|agentLoop -> paused
/// RESUMED               paused|waiting  -> running
/// USER_MESSAGE          agentLoop       -> agentLoop
/// CANCELLED             running|agentLoop|paused|waiting -> cancelled
/// COMPLETE              running         -> complete
/// ERROR                 running|agentLoop -> error
/// ```
pub fn transition(from: RunState, event: EventKind) -> Option<RunState> {
    use EventKind::*;
    use RunState::*;
    match (from, event) {
        (Idle, Start) | (Idle, Restart) => Some(Running),
        (Running, StepStart) => Some(Running),
        (Running, AgentStart) => Some(AgentLoop),
        (AgentLoop, AgentComplete) => Some(Running),
        (Running, Webhook) | (AgentLoop, Webhook) => Some(Waiting),
        (Waiting, WebhookResponse) | (Running, WebhookResponse) => Some(Running),
        (Running, Paused) | (AgentLoop, Paused) => Some(Paused),
        (Paused, Resumed) | (Waiting, Resumed) => Some(Running),
        (AgentLoop, AgentUserMessage) => Some(AgentLoop),
        (Running, Cancelled) | (AgentLoop, Cancelled) | (Paused, Cancelled) | (Waiting, Cancelled) => {
            Some(Cancelled)
        }
        (Running, Complete) => Some(Complete),
        (Running, Error) | (AgentLoop, Error) => Some(Error),
        _ => None,
    }
}

/// Apply `event` to `from`, returning the error-typed rejection when
/// the transition is illegal (spec P3: transition legality).
pub fn apply_transition(
    from: RunState,
    event: EventKind,
) -> Result<RunState, crate::error::Error> {
    transition(from, event).ok_or_else(|| crate::error::Error::TransitionDenied {
        from: format!("{from:?}"),
        signal: format!("{event:?}"),
    })
}

/// Map a [`Signal`] to the [`EventKind`] it would emit, then check
/// whether that event is admissible from `status` (spec §4.C:
/// `isSignalValid`).
pub fn is_signal_valid(status: RunState, signal: &Signal) -> bool {
    let event = match signal {
        Signal::Kill => EventKind::Cancelled,
        Signal::Pause => EventKind::Paused,
        Signal::Resume => EventKind::Resumed,
        Signal::UserMessage { .. } => EventKind::AgentUserMessage,
        Signal::WebhookResponse { .. } => EventKind::WebhookResponse,
    };
    transition(status, event).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_from_idle() {
        assert_eq!(transition(RunState::Idle, EventKind::Start), Some(RunState::Running));
    }

    #[test]
    fn agent_loop_projects_to_running() {
        assert_eq!(RunState::AgentLoop.public_status(), RunState::Running);
        assert_eq!(RunState::Running.public_status(), RunState::Running);
        assert_eq!(RunState::Paused.public_status(), RunState::Paused);
    }

    #[test]
    fn webhook_response_valid_from_waiting_and_running() {
        assert!(is_signal_valid(
            RunState::Waiting,
            &Signal::WebhookResponse {
                payload: serde_json::json!({})
            }
        ));
        assert!(is_signal_valid(
            RunState::Running,
            &Signal::WebhookResponse {
                payload: serde_json::json!({})
            }
        ));
        assert!(!is_signal_valid(
            RunState::Idle,
            &Signal::WebhookResponse {
                payload: serde_json::json!({})
            }
        ));
    }

    #[test]
    fn kill_valid_from_any_non_terminal_state() {
        for s in [RunState::Running, RunState::AgentLoop, RunState::Paused, RunState::Waiting] {
            assert!(is_signal_valid(s, &Signal::Kill), "{s:?} should accept KILL");
        }
        for s in [RunState::Idle, RunState::Complete, RunState::Cancelled, RunState::Error] {
            assert!(!is_signal_valid(s, &Signal::Kill), "{s:?} should reject KILL");
        }
    }

    #[test]
    fn pause_only_from_running_or_agent_loop() {
        assert!(is_signal_valid(RunState::Running, &Signal::Pause));
        assert!(is_signal_valid(RunState::AgentLoop, &Signal::Pause));
        assert!(!is_signal_valid(RunState::Waiting, &Signal::Pause));
        assert!(!is_signal_valid(RunState::Paused, &Signal::Pause));
    }

    #[test]
    fn resume_only_from_paused_or_waiting() {
        assert!(is_signal_valid(RunState::Paused, &Signal::Resume));
        assert!(is_signal_valid(RunState::Waiting, &Signal::Resume));
        assert!(!is_signal_valid(RunState::Running, &Signal::Resume));
    }

    #[test]
    fn user_message_only_in_agent_loop() {
        assert!(is_signal_valid(
            RunState::AgentLoop,
            &Signal::UserMessage { content: "hi".into() }
        ));
        assert!(!is_signal_valid(
            RunState::Running,
            &Signal::UserMessage { content: "hi".into() }
        ));
    }

    #[test]
    fn illegal_transition_is_denied_error() {
        let err = apply_transition(RunState::Idle, EventKind::Complete).unwrap_err();
        assert!(matches!(err, crate::error::Error::TransitionDenied { .. }));
    }

    #[test]
    fn is_terminal() {
        assert!(RunState::Complete.is_terminal());
        assert!(RunState::Cancelled.is_terminal());
        assert!(RunState::Error.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(!RunState::Waiting.is_terminal());
    }

    #[test]
    fn cancelled_reachable_from_every_non_terminal_state() {
        for s in [RunState::Running, RunState::AgentLoop, RunState::Paused, RunState::Waiting] {
            assert_eq!(transition(s, EventKind::Cancelled), Some(RunState::Cancelled));
        }
    }
}
