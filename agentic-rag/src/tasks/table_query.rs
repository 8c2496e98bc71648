use std::sync::Arc;

use tracing::info;

use crate::code_agent::{AgentProfile, CodeRuntime, CodeTask};
use crate::error::{StoreError, ToolError};
use crate::stores::TableCatalog;
use crate::tool_registry::{str_arg, ArgType, ArgumentSpec, ToolArgs, ToolOutput};

pub const NAME: &str = "table_data_question_answering";

pub const DESCRIPTION: &str = "This task requires Query as input, it then answers users query if it can be answered by using provided files";

pub const ARGUMENTS: [ArgumentSpec; 2] = [
    ArgumentSpec::required("file_name", ArgType::String, "Name of the table dataset to analyse"),
    ArgumentSpec::required("query", ArgType::String, "Question to answer from the table"),
];

/// Answers a question over a catalogued table with the data query agent.
pub struct TableQueryTask {
    runtime: CodeRuntime,
    catalog: Arc<dyn TableCatalog>,
    max_iterations: usize,
}

impl TableQueryTask {
    pub fn new(runtime: CodeRuntime, catalog: Arc<dyn TableCatalog>, max_iterations: usize) -> Self {
        Self {
            runtime,
            catalog,
            max_iterations,
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let file_name = str_arg(args, "file_name")?;
        let query = str_arg(args, "query")?;

        let record = self
            .catalog
            .fetch(file_name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "table",
                name: file_name.to_string(),
            })?;

        let result = self
            .runtime
            .agent(AgentProfile::DataQuery, self.max_iterations)
            .ask(&CodeTask {
                query: query.to_string(),
                file_path: record.path.to_string_lossy().to_string(),
                structure: record.summary,
                output_path: None,
            })
            .await?;

        info!(
            "[TableQuery] `{}` answered success={} in {} iterations",
            record.name, result.success, result.iterations
        );
        Ok(ToolOutput::text(result.answer).with_usage(result.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ExecutionObservation;
    use crate::stores::TableRecord;
    use crate::tests::support::{code_runtime, MemoryTables, ScriptedLlm, ScriptedSandboxProvider};
    use serde_json::json;
    use std::path::PathBuf;

    fn catalog() -> Arc<MemoryTables> {
        Arc::new(MemoryTables::new(vec![TableRecord {
            name: "sales".to_string(),
            path: PathBuf::from("sales.csv"),
            summary: "{\"total_rows\": 2}".to_string(),
        }]))
    }

    #[tokio::test]
    async fn test_answers_over_catalogued_table() {
        let llm = Arc::new(ScriptedLlm::new(["```python\nfinal_answer(22)\n```"]));
        let sandboxes = Arc::new(ScriptedSandboxProvider::new(vec![Ok(
            ExecutionObservation::output("22"),
        )]));
        let task = TableQueryTask::new(code_runtime(llm.clone(), sandboxes.clone()), catalog(), 5);

        let args = json!({"file_name": "sales", "query": "total?"});
        let output = task.invoke(args.as_object().unwrap()).await.unwrap();

        assert_eq!(output.content, "22");
        assert_eq!(sandboxes.specs()[0].input_files, vec![PathBuf::from("sales.csv")]);
        let prompt = &llm.calls()[0][1].content;
        assert!(prompt.contains("sales.csv"));
        assert!(prompt.contains("\"total_rows\": 2"));
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let sandboxes = Arc::new(ScriptedSandboxProvider::new(Vec::new()));
        let task = TableQueryTask::new(code_runtime(llm.clone(), sandboxes), catalog(), 5);

        let args = json!({"file_name": "ghost", "query": "total?"});
        let err = task.invoke(args.as_object().unwrap()).await.unwrap_err();
        assert_eq!(err.to_string(), "unknown table: `ghost`");
        assert_eq!(llm.call_count(), 0);
    }
}
