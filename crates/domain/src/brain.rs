//! The Brain IR (spec §4.B) — an immutable, ordered list of typed
//! blocks describing a durable pipeline.
//!
//! Blocks carry no mutable state; everything a block needs at
//! execution time (the JSON state, options, injected resources) is
//! threaded through by the runner, not stored here.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::event::WebhookRegistration;

/// Either a new state value, or `{state, promptResponse}`, or a
/// suspension request, returned by a `Step`'s action.
pub enum StepOutcome {
    State(Value),
    StateWithPrompt { state: Value, prompt_response: Value },
    WaitFor(Vec<WebhookRegistration>),
}

/// Read-only key→blob accessor handed to actions (spec §4.B: `(state,
/// options, client, resources, response?, page?, env, services)`).
/// Actions look up static assets — prompt templates, reference docs,
/// fixtures — by key; the runner decides where those blobs live.
pub trait Resources: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
}

pub type SharedResources = Arc<dyn Resources>;

/// `Resources` impl for a brain with no resource directory configured.
pub struct EmptyResources;

impl Resources for EmptyResources {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }
}

/// Everything a `Step` action or agent tool sees at execution time.
/// Mirrors the `(state, options, client, resources, response?, page?,
/// env, services)` parameter list from spec §4.B — `client` and the
/// page/pages-service hooks live on [`crate::capability`] traits the
/// runner injects, not here.
pub struct StepContext {
    pub state: Value,
    pub options: Value,
    pub resources: SharedResources,
    pub response: Option<Value>,
    pub page: Option<Value>,
    pub env: HashMap<String, String>,
}

pub type StepAction = Arc<dyn Fn(&StepContext) -> Result<StepOutcome> + Send + Sync>;

/// Backoff shape for `BatchPrompt` per-item retry and `Step` retry
/// policies (spec §4.B, §4.F.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    None,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: BackoffKind,
    #[serde(default)]
    pub initial_delay_ms: u64,
    #[serde(default)]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for BackoffKind {
    fn default() -> Self {
        BackoffKind::None
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::None,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given (1-indexed) retry attempt.
    pub fn delay_for(&self, attempt: u32) -> std::time::Duration {
        let ms = match self.backoff {
            BackoffKind::None => 0,
            BackoffKind::Linear => self.initial_delay_ms.saturating_mul(attempt as u64),
            BackoffKind::Exponential => self.initial_delay_ms.saturating_mul(1u64 << attempt.min(32)),
        };
        let capped = if self.max_delay_ms > 0 { ms.min(self.max_delay_ms) } else { ms };
        std::time::Duration::from_millis(capped)
    }
}

/// What to do when a `BatchPrompt` item exhausts its retry budget.
#[derive(Clone)]
pub enum ErrorPolicy {
    Skip,
    Null,
    Abort,
    Custom(Arc<dyn Fn(&Value, &crate::error::Error) -> Value + Send + Sync>),
}

impl std::fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorPolicy::Skip => write!(f, "Skip"),
            ErrorPolicy::Null => write!(f, "Null"),
            ErrorPolicy::Abort => write!(f, "Abort"),
            ErrorPolicy::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// A tool exposed to an `Agent` block. `terminal` tools end the agent
/// sub-loop (spec §4.F.1 step 5); the engine auto-injects a `done`
/// terminal tool if the config doesn't define one.
pub struct AgentTool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub terminal: bool,
    pub execute: Arc<dyn Fn(&Value, &StepContext) -> Result<ToolOutcome> + Send + Sync>,
}

pub enum ToolOutcome {
    Value(Value),
    WaitFor(Vec<WebhookRegistration>),
}

/// Output of an `Agent` block's `configFn`.
pub struct AgentConfig {
    pub system: Option<String>,
    pub prompt: Option<String>,
    pub tools: Vec<AgentTool>,
    pub max_iterations: u32,
    pub max_tokens: Option<u64>,
    pub output_schema: Option<OutputSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

pub type AgentConfigFn = Arc<dyn Fn(&StepContext) -> Result<AgentConfig> + Send + Sync>;

/// `over(state) -> Vec<Value>` selecting the items a `BatchPrompt`
/// fans out across.
pub type BatchOverFn = Arc<dyn Fn(&Value) -> Result<Vec<Value>> + Send + Sync>;
pub type GuardPredicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;
pub type WaitAction = Arc<dyn Fn(&StepContext) -> Result<Vec<WebhookRegistration>> + Send + Sync>;
pub type InitialStateFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type FoldFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// One entry of a Brain's `blocks` list.
#[derive(Clone)]
pub enum Block {
    Step {
        title: String,
        action: StepAction,
    },
    Agent {
        title: String,
        config_fn: AgentConfigFn,
    },
    BatchPrompt {
        title: String,
        over: BatchOverFn,
        template: String,
        schema: Value,
        schema_name: String,
        chunk_size: usize,
        retry: RetryPolicy,
        error_policy: ErrorPolicy,
    },
    Guard {
        predicate: GuardPredicate,
    },
    Wait {
        action: WaitAction,
    },
    SubBrain {
        inner_brain: Arc<Brain>,
        initial_state: InitialStateFn,
        fold: FoldFn,
    },
}

impl Block {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Block::Step { .. } => "step",
            Block::Agent { .. } => "agent",
            Block::BatchPrompt { .. } => "batch_prompt",
            Block::Guard { .. } => "guard",
            Block::Wait { .. } => "wait",
            Block::SubBrain { .. } => "sub_brain",
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            Block::Step { title, .. } => Some(title),
            Block::Agent { title, .. } => Some(title),
            Block::BatchPrompt { title, .. } => Some(title),
            _ => None,
        }
    }
}

/// Metadata accompanying a Brain's block list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrainMeta {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub memory: Option<Value>,
    #[serde(default)]
    pub default_client: Option<String>,
}

/// The immutable IR resolved by a `Manifest` lookup and driven by the
/// runner. Construction validates nothing beyond shape — semantic
/// validity (e.g. a `done` tool auto-injection) is the runner's job.
#[derive(Clone)]
pub struct Brain {
    pub title: String,
    pub description: Option<String>,
    pub blocks: Vec<Block>,
    pub meta: BrainMeta,
}

impl Brain {
    pub fn new(title: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            title: title.into(),
            description: None,
            blocks,
            meta: BrainMeta::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_meta(mut self, meta: BrainMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}
