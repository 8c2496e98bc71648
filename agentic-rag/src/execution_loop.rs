//! Self-correcting execution loop shared by the code, SQL and tool-call agents.
//!
//! Each iteration asks the model for a reply, extracts a candidate from it,
//! executes the candidate and lets the strategy decide whether the result is
//! final. Rejected attempts are fed back into the conversation so the model
//! can correct itself on the next turn.
//!
//! ## Key Types
//! - `LoopStrategy` - Candidate extraction, execution and finality for one agent
//! - `ExecutionLoop` - Drives a strategy for at most `max_iterations` model calls
//! - `LoopOutcome` - Terminal state; never an error

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::LlmError;
use crate::llm::LlmClient;
use crate::protocol::{ArtifactSet, ExecutionObservation, Message, TokenUsage};

// ============================================================================
// Types
// ============================================================================

/// Decision taken after an executed candidate has been observed.
#[derive(Debug, PartialEq)]
pub enum Step<T> {
    /// Terminal success
    Done(T),
    /// Feed `feedback` back to the model and try again
    Retry { feedback: String },
}

/// One instantiation of the loop.
#[async_trait]
pub trait LoopStrategy: Send {
    type Candidate: Send + Sync;
    type Output: Send;

    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Pull a candidate out of the raw model reply. `Err` carries the
    /// corrective message for the model; the attempt is not executed.
    fn extract(&mut self, raw: &str) -> Result<Self::Candidate, String>;

    /// Run the candidate. Failures are reported inside the observation.
    async fn execute(&mut self, candidate: &Self::Candidate) -> ExecutionObservation;

    /// Decide whether this iteration is final. `artifacts` already includes
    /// the files produced by this iteration.
    fn judge(
        &mut self,
        raw: &str,
        candidate: &Self::Candidate,
        observation: &ExecutionObservation,
        artifacts: &ArtifactSet,
    ) -> Step<Self::Output>;

    /// Deterministic message returned when the budget runs out.
    fn exhausted_message(&self, max_iterations: usize) -> String;
}

/// Hook consulted before each iteration; returning `false` stops the loop.
/// Receives the number of iterations already used.
pub type ContinueCheck = Arc<dyn Fn(usize) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    /// Maximum number of model calls
    pub max_iterations: usize,
    /// Upper bound for a single model call
    pub llm_timeout: Duration,
    /// Upper bound for a single candidate execution
    pub execution_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            llm_timeout: Duration::from_secs(120),
            execution_timeout: Duration::from_secs(120),
        }
    }
}

impl LoopSettings {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopStatus<T> {
    Completed(T),
    /// Budget ran out; carries the strategy's fixed message
    Exhausted(String),
    /// Model failure or the continue hook refused the next iteration
    Aborted(String),
}

/// Terminal state of a loop run. Partial progress (artifacts, usage) is
/// reported for every status.
#[derive(Debug, Clone)]
pub struct LoopOutcome<T> {
    pub status: LoopStatus<T>,
    pub artifacts: Vec<String>,
    pub iterations_used: usize,
    pub usage: TokenUsage,
    /// Full conversation as it stood when the loop ended
    pub conversation: Vec<Message>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct ExecutionLoop<'a> {
    llm: &'a dyn LlmClient,
    settings: LoopSettings,
    continue_check: Option<ContinueCheck>,
}

impl<'a> ExecutionLoop<'a> {
    pub fn new(llm: &'a dyn LlmClient, settings: LoopSettings) -> Self {
        Self {
            llm,
            settings,
            continue_check: None,
        }
    }

    pub fn with_continue_check(mut self, check: Option<ContinueCheck>) -> Self {
        self.continue_check = check;
        self
    }

    /// Drive `strategy` starting from `conversation`.
    pub async fn run<S: LoopStrategy>(
        &self,
        mut conversation: Vec<Message>,
        strategy: &mut S,
    ) -> LoopOutcome<S::Output> {
        let max_iterations = self.settings.max_iterations;
        let mut artifacts = ArtifactSet::new();
        let mut usage = TokenUsage::default();
        let mut iterations_used = 0;

        let finish = |status, artifacts: ArtifactSet, iterations_used, usage, conversation| {
            LoopOutcome {
                status,
                artifacts: artifacts.into_vec(),
                iterations_used,
                usage,
                conversation,
            }
        };

        while iterations_used < max_iterations {
            if let Some(check) = &self.continue_check {
                if !check(iterations_used) {
                    info!(
                        "[{}] Stopped by continue check after {} iterations",
                        strategy.name(),
                        iterations_used
                    );
                    let reason = format!("Stopped before iteration {}", iterations_used + 1);
                    return finish(
                        LoopStatus::Aborted(reason),
                        artifacts,
                        iterations_used,
                        usage,
                        conversation,
                    );
                }
            }

            iterations_used += 1;
            debug!(
                "[{}] Iteration {}/{}",
                strategy.name(),
                iterations_used,
                max_iterations
            );

            let raw = match timeout(self.settings.llm_timeout, self.llm.invoke(&conversation)).await
            {
                Ok(Ok(response)) => {
                    usage.add(&response.usage);
                    response.content
                }
                Ok(Err(e)) => {
                    warn!("[{}] Model call failed: {}", strategy.name(), e);
                    return finish(
                        LoopStatus::Aborted(format!("Model call failed: {}", e)),
                        artifacts,
                        iterations_used,
                        usage,
                        conversation,
                    );
                }
                Err(_) => {
                    let e = LlmError::Timeout(self.settings.llm_timeout);
                    warn!("[{}] Model call failed: {}", strategy.name(), e);
                    return finish(
                        LoopStatus::Aborted(format!("Model call failed: {}", e)),
                        artifacts,
                        iterations_used,
                        usage,
                        conversation,
                    );
                }
            };

            let candidate = match strategy.extract(&raw) {
                Ok(candidate) => candidate,
                Err(feedback) => {
                    debug!(
                        "[{}] Candidate rejected before execution on iteration {}",
                        strategy.name(),
                        iterations_used
                    );
                    push_turn(&mut conversation, &raw, feedback);
                    continue;
                }
            };

            let observation = match timeout(
                self.settings.execution_timeout,
                strategy.execute(&candidate),
            )
            .await
            {
                Ok(observation) => observation,
                Err(_) => {
                    warn!(
                        "[{}] Execution timed out after {:?}",
                        strategy.name(),
                        self.settings.execution_timeout
                    );
                    ExecutionObservation::error(format!(
                        "Execution timed out after {:?}",
                        self.settings.execution_timeout
                    ))
                }
            };

            artifacts.extend(observation.artifacts.iter().cloned());

            match strategy.judge(&raw, &candidate, &observation, &artifacts) {
                Step::Done(output) => {
                    info!(
                        "[{}] Completed after {} iterations",
                        strategy.name(),
                        iterations_used
                    );
                    return finish(
                        LoopStatus::Completed(output),
                        artifacts,
                        iterations_used,
                        usage,
                        conversation,
                    );
                }
                Step::Retry { feedback } => push_turn(&mut conversation, &raw, feedback),
            }
        }

        info!(
            "[{}] Budget of {} iterations exhausted",
            strategy.name(),
            max_iterations
        );
        finish(
            LoopStatus::Exhausted(strategy.exhausted_message(max_iterations)),
            artifacts,
            iterations_used,
            usage,
            conversation,
        )
    }
}

/// Append the model's reply (when non-empty) and our feedback.
fn push_turn(conversation: &mut Vec<Message>, raw: &str, feedback: String) {
    if !raw.trim().is_empty() {
        conversation.push(Message::assistant(raw));
    }
    conversation.push(Message::user(feedback));
}
