//! Out-of-band control signals delivered to a running brain.
//!
//! Ordering within a run's queue is by **priority**, not arrival time
//! (spec §4.E): `KILL=1 < PAUSE=2 < WEBHOOK_RESPONSE=3 < RESUME=4 <
//! USER_MESSAGE=5`.

use serde::{Deserialize, Serialize};

/// A control envelope delivered to a run out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Signal {
    #[serde(rename = "KILL")]
    Kill,
    #[serde(rename = "PAUSE")]
    Pause,
    #[serde(rename = "RESUME")]
    Resume,
    #[serde(rename = "USER_MESSAGE")]
    UserMessage { content: String },
    #[serde(rename = "WEBHOOK_RESPONSE")]
    WebhookResponse { payload: serde_json::Value },
}

impl Signal {
    /// Priority for queue ordering — lower sorts first.
    pub fn priority(&self) -> u8 {
        match self {
            Signal::Kill => 1,
            Signal::Pause => 2,
            Signal::WebhookResponse { .. } => 3,
            Signal::Resume => 4,
            Signal::UserMessage { .. } => 5,
        }
    }

    /// The short type name used in the HTTP signal request body and
    /// in event-log/error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Signal::Kill => "KILL",
            Signal::Pause => "PAUSE",
            Signal::Resume => "RESUME",
            Signal::UserMessage { .. } => "USER_MESSAGE",
            Signal::WebhookResponse { .. } => "WEBHOOK_RESPONSE",
        }
    }
}

/// `getSignals(filter)` restricts which signal types are drained.
/// `Control` is what the runner polls at every cooperative checkpoint;
/// `All` is polled immediately after `AGENT_USER_MESSAGE`-eligible
/// events (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalFilter {
    Control,
    All,
}

impl SignalFilter {
    pub fn admits(&self, signal: &Signal) -> bool {
        match self {
            SignalFilter::All => true,
            SignalFilter::Control => matches!(signal, Signal::Kill | Signal::Pause),
        }
    }
}

// A max-heap ordered by ascending numeric priority (KILL sorts highest
// in `BinaryHeap`'s max-heap semantics via `Reverse`-style ordering).
impl PartialEq for Signal {
    fn eq(&self, other: &Self) -> bool {
        self.priority() == other.priority()
    }
}
impl Eq for Signal {}
impl PartialOrd for Signal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Signal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the lowest
        // priority number — i.e. KILL — first.
        other.priority().cmp(&self.priority())
    }
}
