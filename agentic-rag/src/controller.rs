//! Controller - routes one query through task, dataset and retriever
//! selection, then drives the tool-call loop until `final_answer`.
//!
//! Selection failures short-circuit with fixed messages before any tool
//! runs. Inside the loop every failure (unparsable call, unknown tool, tool
//! error) becomes an observation for the model.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{AgentError, LlmError};
use crate::execution_loop::{
    ContinueCheck, ExecutionLoop, LoopSettings, LoopStatus, LoopStrategy, Step,
};
use crate::llm::LlmClient;
use crate::prompts::{controller_system_prompt, DATA_SOURCE_SELECTION_PROMPT, TASK_SELECTION_PROMPT};
use crate::protocol::{ArtifactSet, DatasetDescriptor, ExecutionObservation, Message, TokenUsage};
use crate::retrievers::Retriever;
use crate::stores::DatasetCatalog;
use crate::tasks::Task;
use crate::tool_parsing::{extract_json_object, string_list};
use crate::tool_registry::{ToolArgs, ToolRegistry};

pub const FINAL_ANSWER_TOOL: &str = "final_answer";

const NO_TASK: &str = "Unable to select task";
const NO_DATASET: &str = "Unable to select dataset";
const NO_RETRIEVER: &str = "Unable to select retriever";

/// Everything one query produced. `content` is the answer on success and
/// the user-facing failure message otherwise.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerResponse {
    pub success: bool,
    pub content: String,
    pub iterations: usize,
    pub tasks: Vec<String>,
    pub datasets: Vec<String>,
    pub retrievers: Vec<String>,
    pub artifacts: Vec<String>,
    pub usage: TokenUsage,
}

impl ControllerResponse {
    fn failure(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            success: false,
            content: content.into(),
            usage,
            ..Default::default()
        }
    }
}

pub struct Controller {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<dyn DatasetCatalog>,
    tasks: Vec<Task>,
    retrievers: Vec<Retriever>,
    settings: LoopSettings,
    continue_check: Option<ContinueCheck>,
}

impl Controller {
    /// Fails when two capabilities share a name.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<dyn DatasetCatalog>,
        tasks: Vec<Task>,
        retrievers: Vec<Retriever>,
        settings: LoopSettings,
    ) -> Result<Self, AgentError> {
        let mut seen = HashSet::new();
        let names = tasks
            .iter()
            .map(Task::name)
            .chain(retrievers.iter().map(Retriever::name));
        for name in names {
            if name == FINAL_ANSWER_TOOL || !seen.insert(name) {
                return Err(AgentError::DuplicateCapability(name.to_string()));
            }
        }

        Ok(Self {
            llm,
            catalog,
            tasks,
            retrievers,
            settings,
            continue_check: None,
        })
    }

    pub fn with_continue_check(mut self, check: Option<ContinueCheck>) -> Self {
        self.continue_check = check;
        self
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(Task::name).collect()
    }

    pub fn retriever_names(&self) -> Vec<&'static str> {
        self.retrievers.iter().map(Retriever::name).collect()
    }

    /// Answer `query`. Only a failing dataset catalog is an error; every
    /// other failure is reported in the response.
    pub async fn invoke(&self, query: &str) -> Result<ControllerResponse, AgentError> {
        let mut usage = TokenUsage::default();

        // 1. Tasks
        let tasks = match self.select_tasks(query, &mut usage).await {
            Ok(tasks) if !tasks.is_empty() => tasks,
            Ok(_) => return Ok(ControllerResponse::failure(NO_TASK, usage)),
            Err(e) => return Ok(model_failure(e, usage)),
        };
        let task_names: Vec<String> = tasks.iter().map(|t| t.name().to_string()).collect();
        info!("[Controller] Tasks to perform: {:?}", task_names);

        // 2. Datasets
        let datasets = match self.select_datasets(query, &mut usage).await? {
            Ok(datasets) if !datasets.is_empty() => datasets,
            Ok(_) => {
                return Ok(ControllerResponse {
                    tasks: task_names,
                    ..ControllerResponse::failure(NO_DATASET, usage)
                })
            }
            Err(e) => return Ok(model_failure(e, usage)),
        };
        let dataset_names: Vec<String> = datasets.iter().map(|d| d.name.clone()).collect();
        info!("[Controller] Relevant datasets selected: {:?}", dataset_names);

        // 3. Retrievers
        let retrievers = self.select_retrievers(&datasets);
        if retrievers.is_empty() {
            return Ok(ControllerResponse {
                tasks: task_names,
                datasets: dataset_names,
                ..ControllerResponse::failure(NO_RETRIEVER, usage)
            });
        }
        let retriever_names: Vec<String> =
            retrievers.iter().map(|r| r.name().to_string()).collect();
        info!("[Controller] Retriever selected: {:?}", retriever_names);

        // 4. Registry
        let mut registry = ToolRegistry::new();
        for retriever in retrievers.iter().copied() {
            registry.register_retriever(retriever)?;
        }
        for task in tasks.iter().copied() {
            registry.register_task(task)?;
        }

        // 5. Tool-call loop
        let conversation = vec![
            Message::system(controller_system_prompt(
                &registry.metadata(),
                &format_datasets(&datasets),
            )),
            Message::user(query),
        ];
        let mut strategy = ToolCallStrategy {
            registry: &registry,
            query,
            tool_usage: TokenUsage::default(),
        };
        let outcome = ExecutionLoop::new(self.llm.as_ref(), self.settings.clone())
            .with_continue_check(self.continue_check.clone())
            .run(conversation, &mut strategy)
            .await;
        usage.add(&outcome.usage);
        usage.add(&strategy.tool_usage);

        let (success, content) = match outcome.status {
            LoopStatus::Completed(answer) => (true, answer),
            LoopStatus::Exhausted(message) | LoopStatus::Aborted(message) => (false, message),
        };
        Ok(ControllerResponse {
            success,
            content,
            iterations: outcome.iterations_used,
            tasks: task_names,
            datasets: dataset_names,
            retrievers: retriever_names,
            artifacts: outcome.artifacts,
            usage,
        })
    }

    async fn select_tasks(
        &self,
        query: &str,
        usage: &mut TokenUsage,
    ) -> Result<Vec<&Task>, LlmError> {
        if self.tasks.is_empty() {
            warn!("[Controller] No tasks registered");
            return Ok(Vec::new());
        }

        let task_list: Vec<Value> = self
            .tasks
            .iter()
            .map(|t| json!({"name": t.name(), "description": t.description()}))
            .collect();
        let user = format!(
            "Query: {}\n Tasks and Description:\n ```json\n{}\n```",
            query,
            pretty(&task_list)
        );
        let reply = self.select(TASK_SELECTION_PROMPT, user, usage).await?;
        let selected = string_list(&extract_json_object(&reply), "tasks");
        debug!("[Controller] Task selection reply names {:?}", selected);

        Ok(self
            .tasks
            .iter()
            .filter(|t| selected.iter().any(|s| s == t.name()))
            .collect())
    }

    /// Outer error: the catalog failed. Inner error: the model call failed.
    async fn select_datasets(
        &self,
        query: &str,
        usage: &mut TokenUsage,
    ) -> Result<Result<Vec<DatasetDescriptor>, LlmError>, AgentError> {
        let mut seen = HashSet::new();
        let datasets: Vec<DatasetDescriptor> = self
            .catalog
            .list_all()
            .await?
            .into_iter()
            .filter(|d| seen.insert((d.name.clone(), d.description.clone())))
            .collect();
        if datasets.is_empty() {
            warn!("[Controller] Dataset catalog is empty");
            return Ok(Ok(Vec::new()));
        }

        let data_list: Vec<Value> = datasets
            .iter()
            .map(|d| json!({"name": d.name, "description": d.description}))
            .collect();
        let user = format!(
            "Query: {}\n Datasets and Description:\n ```json\n{}\n```",
            query,
            pretty(&data_list)
        );
        let reply = match self.select(DATA_SOURCE_SELECTION_PROMPT, user, usage).await {
            Ok(reply) => reply,
            Err(e) => return Ok(Err(e)),
        };

        let mut picked = HashSet::new();
        let selected = string_list(&extract_json_object(&reply), "data_sources")
            .into_iter()
            .filter_map(|name| datasets.iter().find(|d| d.name == name))
            .filter(|d| picked.insert(d.name.clone()))
            .cloned()
            .collect();
        Ok(Ok(selected))
    }

    /// For each selected dataset, in order, the retrievers working on its
    /// format. Each retriever appears once.
    fn select_retrievers(&self, datasets: &[DatasetDescriptor]) -> Vec<&Retriever> {
        let mut selected: Vec<&Retriever> = Vec::new();
        for dataset in datasets {
            for retriever in self.retrievers.iter().filter(|r| r.format() == dataset.format) {
                if !selected.iter().any(|s| std::ptr::eq(*s, retriever)) {
                    debug!(
                        "[Controller] {} serves dataset {}",
                        retriever.name(),
                        dataset.name
                    );
                    selected.push(retriever);
                }
            }
        }
        selected
    }

    async fn select(
        &self,
        system: &str,
        user: String,
        usage: &mut TokenUsage,
    ) -> Result<String, LlmError> {
        let messages = [Message::system(system), Message::user(user)];
        let response = timeout(self.settings.llm_timeout, self.llm.invoke(&messages))
            .await
            .map_err(|_| LlmError::Timeout(self.settings.llm_timeout))??;
        usage.add(&response.usage);
        Ok(response.content)
    }
}

fn model_failure(e: LlmError, usage: TokenUsage) -> ControllerResponse {
    warn!("[Controller] Selection call failed: {}", e);
    ControllerResponse::failure(format!("Model call failed: {}", e), usage)
}

fn pretty(value: &[Value]) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// Dataset block of the controller system message.
pub fn format_datasets(datasets: &[DatasetDescriptor]) -> String {
    datasets
        .iter()
        .map(|d| format!("\n- Name: {}\n- Description: {}\n\n", d.name, d.description))
        .collect()
}

// ========== Tool-call loop ==========

struct ToolCall {
    tool: String,
    args: ToolArgs,
}

struct ToolCallStrategy<'a> {
    registry: &'a ToolRegistry<'a>,
    query: &'a str,
    /// Usage spent inside tools, kept apart from the loop's own calls
    tool_usage: TokenUsage,
}

impl ToolCallStrategy<'_> {
    fn remind(&self, text: &str) -> String {
        format!("{}\n Original User query was : {}", text, self.query)
    }

    fn parse_error(&self, reason: &str) -> String {
        self.remind(&format!("Error: {}", reason))
    }
}

#[async_trait]
impl LoopStrategy for ToolCallStrategy<'_> {
    type Candidate = ToolCall;
    type Output = String;

    fn name(&self) -> &'static str {
        "Controller"
    }

    fn extract(&mut self, raw: &str) -> Result<ToolCall, String> {
        let mut obj = extract_json_object(raw);
        if obj.is_empty() {
            return Err(self.parse_error(
                "No tool call found. Respond with one JSON object {\"tool\": ..., \"args\": {...}}.",
            ));
        }

        let tool = match obj.get("tool").and_then(Value::as_str) {
            Some(tool) => tool.trim().to_string(),
            None => return Err(self.parse_error("Tool call is missing the `tool` name.")),
        };
        let args = match obj.remove("args") {
            None | Some(Value::Null) => ToolArgs::new(),
            Some(Value::Object(args)) => args,
            Some(_) => return Err(self.parse_error("`args` must be a JSON object.")),
        };

        if tool == FINAL_ANSWER_TOOL && !args.get("answer").is_some_and(Value::is_string) {
            return Err(self.parse_error("`final_answer` requires a string `args.answer`."));
        }
        Ok(ToolCall { tool, args })
    }

    async fn execute(&mut self, call: &ToolCall) -> ExecutionObservation {
        if call.tool == FINAL_ANSWER_TOOL {
            return ExecutionObservation::default();
        }

        let Some(tool) = self.registry.get(&call.tool) else {
            warn!("[Controller] Unknown tool called: {}", call.tool);
            return ExecutionObservation::error(format!("Unknown tool called: {}", call.tool));
        };

        debug!("[Controller] Tool `{}` called with args: {:?}", call.tool, call.args);
        match tool.invoke(&call.args).await {
            Ok(output) => {
                info!("[Controller] {} output: {}", call.tool, output.content);
                self.tool_usage.add(&output.usage);
                ExecutionObservation::output(output.content).with_artifacts(output.artifacts)
            }
            Err(e) => {
                warn!("[Controller] {} tool execution failed: {}", call.tool, e);
                ExecutionObservation::error(format!("Error executing {} tool: {}", call.tool, e))
            }
        }
    }

    fn judge(
        &mut self,
        _raw: &str,
        call: &ToolCall,
        observation: &ExecutionObservation,
        _artifacts: &ArtifactSet,
    ) -> Step<String> {
        if call.tool == FINAL_ANSWER_TOOL {
            let answer = call
                .args
                .get("answer")
                .and_then(Value::as_str)
                .unwrap_or_default();
            info!("[Controller] Final answer generated");
            return Step::Done(answer.to_string());
        }

        let text = observation
            .output_text()
            .or_else(|| observation.error_text())
            .unwrap_or_default();
        Step::Retry {
            feedback: self.remind(&format!("Tool Output: {}", text)),
        }
    }

    fn exhausted_message(&self, max_iterations: usize) -> String {
        format!(
            "Unable to complete the request within {} iterations.",
            max_iterations
        )
    }
}
