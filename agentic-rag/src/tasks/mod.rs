//! Agent tools: capabilities that produce the answer.
//!
//! `Task` is a closed enum; the controller selects a subset per query and
//! registers them under their names.

pub mod chart_generation;
pub mod question_answering;
pub mod table_query;

use crate::error::ToolError;
use crate::tool_registry::{ArgumentSpec, ToolArgs, ToolDescriptor, ToolKind, ToolOutput};

pub use chart_generation::ChartGenerationTask;
pub use question_answering::QuestionAnsweringTask;
pub use table_query::TableQueryTask;

pub enum Task {
    QuestionAnswering(QuestionAnsweringTask),
    ChartGeneration(ChartGenerationTask),
    TableQuery(TableQueryTask),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::QuestionAnswering(_) => question_answering::NAME,
            Task::ChartGeneration(_) => chart_generation::NAME,
            Task::TableQuery(_) => table_query::NAME,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Task::QuestionAnswering(_) => question_answering::DESCRIPTION,
            Task::ChartGeneration(_) => chart_generation::DESCRIPTION,
            Task::TableQuery(_) => table_query::DESCRIPTION,
        }
    }

    pub fn arguments(&self) -> Vec<ArgumentSpec> {
        match self {
            Task::QuestionAnswering(_) => question_answering::ARGUMENTS.to_vec(),
            Task::ChartGeneration(_) => chart_generation::ARGUMENTS.to_vec(),
            Task::TableQuery(_) => table_query::ARGUMENTS.to_vec(),
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            kind: ToolKind::Task,
            description: self.description().to_string(),
            arguments: self.arguments(),
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        match self {
            Task::QuestionAnswering(task) => task.invoke(args).await,
            Task::ChartGeneration(task) => task.invoke(args).await,
            Task::TableQuery(task) => task.invoke(args).await,
        }
    }
}
