/// Shared error type used across all brain-engine crates.
///
/// Carries both the closed error-kind set from the engine's own design
/// (`BadPatch` .. `Upstream`) and the ambient infrastructure variants
/// (`Io`, `Json`, `Http`, ...) used by the provider/tool/skill layers.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    // ── Closed brain-engine error set (spec §7) ──────────────────────
    #[error("malformed JSON patch: {0}")]
    BadPatch(String),

    #[error("invalid brain IR: {0}")]
    IrInvalid(String),

    #[error("unknown brain: {0}")]
    UnknownBrain(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("agent token limit exceeded: used {used}, limit {limit}")]
    TokenLimit { used: u64, limit: u64 },

    #[error("transition denied: {signal} not admissible from {from}")]
    TransitionDenied { from: String, signal: String },

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("run is terminal: {0}")]
    RunTerminal(String),

    #[error("no waiter for ({slug}, {identifier})")]
    WaiterNotFound { slug: String, identifier: String },

    #[error("CSRF token mismatch")]
    CsrfMismatch,

    #[error("upstream error from {provider}: {message}")]
    Upstream { provider: String, message: String },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
