//! Error types shared across the orchestration layers.
//!
//! Loop-internal failures never surface through these types: the loops turn
//! them into observation text or a terminal outcome. These errors describe
//! collaborator failures (model, sandbox, stores) and construction problems.

use std::time::Duration;

use thiserror::Error;

/// Failures from an `LlmClient`.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Rate limited and the backoff ceiling was reached
    #[error("rate limit persisted after {attempts} attempts")]
    RateLimitExhausted { attempts: u32 },
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed model response: {0}")]
    MalformedResponse(String),
    #[error("missing API key: environment variable `{0}` is not set")]
    MissingApiKey(String),
}

/// Failures from a sandbox session.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The backend asked us to slow down; callers retry with backoff
    #[error("sandbox rate limited: {0}")]
    RateLimited(String),
    #[error("failed to start sandbox: {0}")]
    Startup(String),
    #[error("sandbox session closed: {0}")]
    SessionClosed(String),
    #[error("sandbox protocol error: {0}")]
    Protocol(String),
    #[error("sandbox io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SandboxError::RateLimited(_))
    }
}

/// Failures from the metadata, table, text and database collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown {kind}: `{name}`")]
    NotFound { kind: &'static str, name: String },
    #[error("database error: {0}")]
    Database(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid store data: {0}")]
    Invalid(String),
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Failures raised while a capability runs. The controller reports them to
/// the model as `Error executing {tool} tool: {error}`.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("missing required argument `{0}`")]
    MissingArgument(String),
    #[error("argument `{name}` must be {expected}")]
    InvalidArgument { name: String, expected: &'static str },
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

/// Settings file problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("invalid setting `{field}`: {message}")]
    Invalid { field: &'static str, message: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Problems detected while assembling the orchestration graph.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("duplicate capability name `{0}`")]
    DuplicateCapability(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}
