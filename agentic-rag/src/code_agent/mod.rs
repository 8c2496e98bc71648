//! Code agents: the execution loop instantiated over a Python sandbox.
//!
//! The model writes Python, the sandbox runs it with a small prelude of
//! helpers, and the printed output becomes the next observation. An
//! iteration is final when the code calls `final_answer(...)` and runs
//! cleanly (or, for table extraction, on any clean run).
//!
//! ## Profiles
//! - `DataQuery` - pandas analysis, answers with `final_answer`
//! - `ChartQuery` - matplotlib charts plus `explain_chart`; charts are collected
//! - `TableExtraction` - writes a CSV slice; any clean run is final

pub mod prelude;
pub mod prompts;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::ToolError;
use crate::execution_loop::{
    ContinueCheck, ExecutionLoop, LoopSettings, LoopStatus, LoopStrategy, Step,
};
use crate::llm::{LlmClient, RetryPolicy};
use crate::protocol::{ArtifactSet, ExecutionObservation, Message, TokenUsage};
use crate::sandbox::{run_with_backoff, Sandbox, SandboxProvider, SandboxSpec};
use crate::tool_parsing::extract_python_code;

const UNKNOWN_FAILURE: &str = "Error occurred while executing code, and unable to detect reason.";

const FINAL_WITH_PRINT: &str = "\n\nIt seems like you're trying to give final answer and printing other values as well, don't do that. Call final_answer() again based on above response without any extra print() function calls, not even in try except block.";

/// Logged code is cut to this many characters.
const LOG_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentProfile {
    DataQuery,
    ChartQuery,
    TableExtraction,
}

impl AgentProfile {
    pub fn name(&self) -> &'static str {
        match self {
            AgentProfile::DataQuery => "DataQueryAgent",
            AgentProfile::ChartQuery => "ChartQueryAgent",
            AgentProfile::TableExtraction => "TableExtractionAgent",
        }
    }

    pub fn libraries(&self) -> &'static [&'static str] {
        match self {
            AgentProfile::DataQuery => &["pandas", "tabulate"],
            AgentProfile::ChartQuery => &["matplotlib", "seaborn", "plotille", "tabulate"],
            AgentProfile::TableExtraction => &["pandas"],
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentProfile::DataQuery => prompts::DATA_QUERY_SYSTEM_PROMPT,
            AgentProfile::ChartQuery => prompts::CHART_QUERY_SYSTEM_PROMPT,
            AgentProfile::TableExtraction => prompts::TABLE_EXTRACTION_SYSTEM_PROMPT,
        }
    }

    /// Helper source prepended to every execution.
    pub fn prelude(&self) -> String {
        match self {
            AgentProfile::ChartQuery => {
                format!("{}\n{}", prelude::FINAL_ANSWER, prelude::CHART_HELPERS)
            }
            _ => prelude::FINAL_ANSWER.to_string(),
        }
    }
}

/// What a code agent run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAgentResult {
    pub success: bool,
    /// Final output on success, otherwise the failure message
    pub answer: String,
    /// Files produced across all iterations, first-seen order
    pub artifacts: Vec<String>,
    pub iterations: usize,
    pub usage: TokenUsage,
}

/// One query against one file.
#[derive(Debug, Clone)]
pub struct CodeTask {
    pub query: String,
    pub file_path: String,
    pub structure: String,
    /// Where table extraction writes its CSV
    pub output_path: Option<String>,
}

/// Collaborators shared by every code-backed capability.
#[derive(Clone)]
pub struct CodeRuntime {
    pub llm: Arc<dyn LlmClient>,
    pub sandboxes: Arc<dyn SandboxProvider>,
    pub loop_settings: LoopSettings,
    /// Sandbox rate-limit backoff
    pub retry: RetryPolicy,
}

impl CodeRuntime {
    pub fn agent(&self, profile: AgentProfile, max_iterations: usize) -> CodeAgent {
        CodeAgent::new(profile, self.llm.clone(), self.sandboxes.clone())
            .with_loop_settings(self.loop_settings.clone().with_max_iterations(max_iterations))
            .with_retry(self.retry.clone())
    }
}

pub struct CodeAgent {
    llm: Arc<dyn LlmClient>,
    sandboxes: Arc<dyn SandboxProvider>,
    profile: AgentProfile,
    settings: LoopSettings,
    retry: RetryPolicy,
    artifacts_dir: Option<PathBuf>,
    continue_check: Option<ContinueCheck>,
}

impl CodeAgent {
    pub fn new(
        profile: AgentProfile,
        llm: Arc<dyn LlmClient>,
        sandboxes: Arc<dyn SandboxProvider>,
    ) -> Self {
        Self {
            llm,
            sandboxes,
            profile,
            settings: LoopSettings::default(),
            retry: RetryPolicy::default(),
            artifacts_dir: None,
            continue_check: None,
        }
    }

    pub fn with_loop_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Backoff used when the sandbox reports rate limiting.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Directory charts are collected into.
    pub fn with_artifacts_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.artifacts_dir = dir;
        self
    }

    pub fn with_continue_check(mut self, check: Option<ContinueCheck>) -> Self {
        self.continue_check = check;
        self
    }

    /// Run the loop for `task`. Only a sandbox that cannot be opened is an
    /// error; everything that happens inside the loop ends in a result.
    pub async fn ask(&self, task: &CodeTask) -> Result<CodeAgentResult, ToolError> {
        let spec = SandboxSpec {
            extra_libraries: self
                .profile
                .libraries()
                .iter()
                .map(|s| s.to_string())
                .collect(),
            input_files: vec![PathBuf::from(&task.file_path)],
            artifacts_dir: self.artifacts_dir.clone(),
        };
        let sandbox = self.sandboxes.open(spec).await?;

        let user_prompt = match (self.profile, &task.output_path) {
            (AgentProfile::TableExtraction, Some(output_path)) => {
                prompts::table_extraction_user_prompt(
                    &task.query,
                    &task.file_path,
                    output_path,
                    &task.structure,
                )
            }
            _ => prompts::default_user_prompt(&task.query, &task.file_path, &task.structure),
        };
        let conversation = vec![
            Message::system(self.profile.system_prompt()),
            Message::user(user_prompt),
        ];

        info!(
            "[{}] Answering `{}` over {}",
            self.profile.name(),
            task.query,
            task.file_path
        );

        let mut strategy = CodeLoopStrategy {
            profile: self.profile,
            sandbox,
            prelude: self.profile.prelude(),
            query: task.query.clone(),
            output_path: task.output_path.clone(),
            retry: self.retry.clone(),
        };
        let outcome = ExecutionLoop::new(self.llm.as_ref(), self.settings.clone())
            .with_continue_check(self.continue_check.clone())
            .run(conversation, &mut strategy)
            .await;

        let (success, answer) = match outcome.status {
            LoopStatus::Completed(answer) => (true, answer),
            LoopStatus::Exhausted(message) | LoopStatus::Aborted(message) => (false, message),
        };
        Ok(CodeAgentResult {
            success,
            answer,
            artifacts: outcome.artifacts,
            iterations: outcome.iterations_used,
            usage: outcome.usage,
        })
    }
}

struct CodeLoopStrategy {
    profile: AgentProfile,
    sandbox: Box<dyn Sandbox>,
    prelude: String,
    query: String,
    output_path: Option<String>,
    retry: RetryPolicy,
}

impl CodeLoopStrategy {
    fn with_reminder(&self, text: &str) -> String {
        format!(
            "{}\n-----\n\nRemember user's original query is : {}, if above response answers it, reprint response in final_answer(), else generate next iteration of code",
            text, self.query
        )
    }

    fn observation_text(observation: &ExecutionObservation) -> String {
        observation
            .output_text()
            .or_else(|| observation.error_text())
            .unwrap_or(UNKNOWN_FAILURE)
            .to_string()
    }
}

#[async_trait]
impl LoopStrategy for CodeLoopStrategy {
    type Candidate = String;
    type Output = String;

    fn name(&self) -> &'static str {
        self.profile.name()
    }

    fn extract(&mut self, raw: &str) -> Result<String, String> {
        extract_python_code(raw).map_err(|e| match self.profile {
            AgentProfile::TableExtraction => format!("Error occurred while parsing code: {}", e),
            _ => self.with_reminder(&e),
        })
    }

    async fn execute(&mut self, code: &String) -> ExecutionObservation {
        debug!(
            "[{}] Executing: {}",
            self.profile.name(),
            preview(code, LOG_PREVIEW_CHARS)
        );
        let full = format!("{}\n{}", self.prelude, code);
        match run_with_backoff(self.sandbox.as_mut(), &full, &self.retry).await {
            Ok(observation) => observation,
            Err(e) => ExecutionObservation::error(e.to_string()),
        }
    }

    fn judge(
        &mut self,
        _raw: &str,
        code: &String,
        observation: &ExecutionObservation,
        _artifacts: &ArtifactSet,
    ) -> Step<String> {
        let clean = observation.error_text().is_none();

        if self.profile == AgentProfile::TableExtraction {
            if clean {
                let target = self
                    .output_path
                    .as_deref()
                    .unwrap_or("retrieved_data/table_data.csv");
                return Step::Done(format!("Relevant table saved at `{}`", target));
            }
            return Step::Retry {
                feedback: format!(
                    "Error during code execution: {}",
                    Self::observation_text(observation)
                ),
            };
        }

        let mut text = Self::observation_text(observation);
        if clean && code.contains("final_answer(") {
            if !code.contains("print(") {
                return Step::Done(observation.output.clone().unwrap_or_default());
            }
            text.push_str(FINAL_WITH_PRINT);
        }
        Step::Retry {
            feedback: self.with_reminder(&text),
        }
    }

    fn exhausted_message(&self, max_iterations: usize) -> String {
        match self.profile {
            AgentProfile::TableExtraction => {
                "Failed to retrieve table after multiple attempts.".to_string()
            }
            _ => format!(
                "Sorry, I'm unable to answer your question within {} iterations, either due to the complexity of your query or I was unable to debug errors.",
                max_iterations
            ),
        }
    }
}

/// First `max` characters of `text`, with an ellipsis when cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
