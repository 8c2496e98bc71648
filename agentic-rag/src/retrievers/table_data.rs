use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::code_agent::{AgentProfile, CodeRuntime, CodeTask};
use crate::error::{StoreError, ToolError};
use crate::stores::TableCatalog;
use crate::tool_registry::{str_arg, ArgType, ArgumentSpec, ToolArgs, ToolOutput};

pub const NAME: &str = "table_data_retriever";

pub const DESCRIPTION: &str = "This retriever requires a user query and csv file path. It then extracts relevant data from the csv file to solve user query and saves as `retrieved_data/table_data.csv` using pandas. It can extract particular row, column or even perform aggregation, grouping etc. on tabular data.";

pub const ARGUMENTS: [ArgumentSpec; 2] = [
    ArgumentSpec::required("query", ArgType::String, "What data to extract from the table"),
    ArgumentSpec::required("data_name", ArgType::String, "Name of the table dataset"),
];

/// Extracts a slice of a catalogued table with the table extraction agent.
pub struct TableDataRetriever {
    runtime: CodeRuntime,
    catalog: Arc<dyn TableCatalog>,
    retrieved_dir: PathBuf,
    max_iterations: usize,
}

impl TableDataRetriever {
    pub fn new(
        runtime: CodeRuntime,
        catalog: Arc<dyn TableCatalog>,
        retrieved_dir: impl Into<PathBuf>,
        max_iterations: usize,
    ) -> Self {
        Self {
            runtime,
            catalog,
            retrieved_dir: retrieved_dir.into(),
            max_iterations,
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let query = str_arg(args, "query")?;
        let data_name = str_arg(args, "data_name")?;

        let record = self
            .catalog
            .fetch(data_name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "table",
                name: data_name.to_string(),
            })?;

        tokio::fs::create_dir_all(&self.retrieved_dir).await?;
        let output_path = self.retrieved_dir.join("table_data.csv");

        let result = self
            .runtime
            .agent(AgentProfile::TableExtraction, self.max_iterations)
            .ask(&CodeTask {
                query: query.to_string(),
                file_path: record.path.to_string_lossy().to_string(),
                structure: record.summary,
                output_path: Some(output_path.to_string_lossy().to_string()),
            })
            .await?;

        info!(
            "[TableDataRetriever] `{}` extracted success={} in {} iterations",
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

    fn catalog() -> Arc<MemoryTables> {
        Arc::new(MemoryTables::new(vec![TableRecord {
            name: "employees".to_string(),
            path: PathBuf::from("employees.csv"),
            summary: "{}".to_string(),
        }]))
    }

    #[tokio::test]
    async fn test_clean_run_reports_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new([
            "```python\ndf = pd.read_csv('employees.csv')\n```",
            "```python\ndf[df.age > 30].to_csv(out)\n```",
        ]));
        let sandboxes = Arc::new(ScriptedSandboxProvider::new(vec![
            Ok(ExecutionObservation::error("NameError: name 'pd' is not defined")),
            Ok(ExecutionObservation::output("")),
        ]));
        let retriever = TableDataRetriever::new(
            code_runtime(llm.clone(), sandboxes),
            catalog(),
            dir.path(),
            4,
        );

        let args = json!({"query": "employees over 30", "data_name": "employees"});
        let output = retriever.invoke(args.as_object().unwrap()).await.unwrap();

        let target = dir.path().join("table_data.csv");
        assert_eq!(
            output.content,
            format!("Relevant table saved at `{}`", target.display())
        );
        let calls = llm.calls();
        assert!(calls[0][1].content.contains(&format!("Output Path: {}", target.display())));
        assert_eq!(
            calls[1].last().unwrap().content,
            "Error during code execution: NameError: name 'pd' is not defined"
        );
    }

    #[tokio::test]
    async fn test_exhaustion_message() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()).with_fallback("no code here"));
        let sandboxes = Arc::new(ScriptedSandboxProvider::new(Vec::new()));
        let retriever =
            TableDataRetriever::new(code_runtime(llm.clone(), sandboxes.clone()), catalog(), dir.path(), 2);

        let args = json!({"query": "q", "data_name": "employees"});
        let output = retriever.invoke(args.as_object().unwrap()).await.unwrap();
        assert_eq!(output.content, "Failed to retrieve table after multiple attempts.");
        assert_eq!(llm.call_count(), 2);
        assert!(sandboxes.executed().is_empty());
    }
}
