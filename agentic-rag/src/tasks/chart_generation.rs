use std::path::PathBuf;

use tracing::info;

use crate::code_agent::{AgentProfile, CodeRuntime, CodeTask};
use crate::error::{StoreError, ToolError};
use crate::stores::summarize_csv;
use crate::tool_registry::{str_arg, ArgType, ArgumentSpec, ToolArgs, ToolOutput};

pub const NAME: &str = "chart_generation";

pub const DESCRIPTION: &str = "This task requires csv file path as source data and a query to make chart, it then generates chart and return file path of the chart";

pub const ARGUMENTS: [ArgumentSpec; 2] = [
    ArgumentSpec::required("query", ArgType::String, "What the chart should show"),
    ArgumentSpec::required("file_path", ArgType::String, "Path of the csv file with the source data"),
];

/// Builds charts from a CSV file with the chart code agent.
pub struct ChartGenerationTask {
    runtime: CodeRuntime,
    charts_dir: PathBuf,
    max_iterations: usize,
}

impl ChartGenerationTask {
    pub fn new(runtime: CodeRuntime, charts_dir: impl Into<PathBuf>, max_iterations: usize) -> Self {
        Self {
            runtime,
            charts_dir: charts_dir.into(),
            max_iterations,
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let query = str_arg(args, "query")?;
        let file_path = str_arg(args, "file_path")?;

        let path = PathBuf::from(file_path);
        let structure = tokio::task::spawn_blocking(move || summarize_csv(&path))
            .await
            .map_err(|e| StoreError::Invalid(format!("summary task failed: {}", e)))??;

        tokio::fs::create_dir_all(&self.charts_dir).await?;

        let agent = self
            .runtime
            .agent(AgentProfile::ChartQuery, self.max_iterations)
            .with_artifacts_dir(Some(self.charts_dir.clone()));
        let result = agent
            .ask(&CodeTask {
                query: query.to_string(),
                file_path: file_path.to_string(),
                structure,
                output_path: None,
            })
            .await?;

        info!(
            "[ChartGeneration] success={} charts={} iterations={}",
            result.success,
            result.artifacts.len(),
            result.iterations
        );

        let mut content = result.answer;
        if !result.artifacts.is_empty() {
            content.push_str(&format!(
                "\n\nGenerated charts: {}",
                result.artifacts.join(", ")
            ));
        }
        Ok(ToolOutput::text(content)
            .with_artifacts(result.artifacts)
            .with_usage(result.usage))
    }
}
