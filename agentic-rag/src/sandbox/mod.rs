//! Code execution sandbox seam.
//!
//! Code agents only see `Sandbox` (one session with persistent interpreter
//! state) and `SandboxProvider` (opens sessions seeded with libraries and
//! input files). `local_python` is the bundled backend.

pub mod local_python;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::warn;

use crate::error::SandboxError;
use crate::llm::RetryPolicy;
use crate::protocol::ExecutionObservation;

pub use local_python::{LocalPythonProvider, LocalPythonSandbox};

/// What a session must be seeded with.
#[derive(Debug, Clone, Default)]
pub struct SandboxSpec {
    /// Libraries the generated code may import
    pub extra_libraries: Vec<String>,
    /// Files the generated code reads, made available at the same path
    pub input_files: Vec<PathBuf>,
    /// Where produced images are collected on the host
    pub artifacts_dir: Option<PathBuf>,
}

/// One interpreter session. Variables persist across `run` calls.
#[async_trait]
pub trait Sandbox: Send {
    async fn run(&mut self, code: &str) -> Result<ExecutionObservation, SandboxError>;
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn open(&self, spec: SandboxSpec) -> Result<Box<dyn Sandbox>, SandboxError>;
}

/// Run `code`, retrying with backoff while the backend reports rate limiting.
pub async fn run_with_backoff(
    sandbox: &mut dyn Sandbox,
    code: &str,
    policy: &RetryPolicy,
) -> Result<ExecutionObservation, SandboxError> {
    let mut backoff = policy.backoff();
    loop {
        match sandbox.run(code).await {
            Err(e) if e.is_rate_limited() => match backoff.next_delay() {
                Some(delay) => {
                    warn!("[Sandbox] {} - retrying in {:?}", e, delay);
                    sleep(delay).await;
                }
                None => return Err(e),
            },
            other => return other,
        }
    }
}
