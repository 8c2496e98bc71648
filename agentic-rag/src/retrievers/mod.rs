//! Retriever tools: fetch the minimal slice of a dataset a task needs and
//! write it under the retrieved-data directory.
//!
//! Each retriever works on one `DataFormat`; the controller offers a
//! retriever only when a selected dataset has that format.

pub mod sql;
pub mod table_data;
pub mod vector;

use crate::error::ToolError;
use crate::protocol::DataFormat;
use crate::tool_registry::{ArgumentSpec, ToolArgs, ToolDescriptor, ToolKind, ToolOutput};

pub use sql::{SqlOutcome, SqlRetriever, SqlRun};
pub use table_data::TableDataRetriever;
pub use vector::VectorRetriever;

pub enum Retriever {
    Vector(VectorRetriever),
    TableData(TableDataRetriever),
    Sql(SqlRetriever),
}

impl Retriever {
    pub fn name(&self) -> &'static str {
        match self {
            Retriever::Vector(_) => vector::NAME,
            Retriever::TableData(_) => table_data::NAME,
            Retriever::Sql(_) => sql::NAME,
        }
    }

    /// Dataset format this retriever works on.
    pub fn format(&self) -> DataFormat {
        match self {
            Retriever::Vector(_) => DataFormat::Text,
            Retriever::TableData(_) => DataFormat::Table,
            Retriever::Sql(_) => DataFormat::ExternalDb,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Retriever::Vector(_) => vector::DESCRIPTION,
            Retriever::TableData(_) => table_data::DESCRIPTION,
            Retriever::Sql(_) => sql::DESCRIPTION,
        }
    }

    pub fn arguments(&self) -> Vec<ArgumentSpec> {
        match self {
            Retriever::Vector(_) => vector::ARGUMENTS.to_vec(),
            Retriever::TableData(_) => table_data::ARGUMENTS.to_vec(),
            Retriever::Sql(_) => sql::ARGUMENTS.to_vec(),
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            kind: ToolKind::Retriever,
            description: self.description().to_string(),
            arguments: self.arguments(),
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        match self {
            Retriever::Vector(retriever) => retriever.invoke(args).await,
            Retriever::TableData(retriever) => retriever.invoke(args).await,
            Retriever::Sql(retriever) => retriever.invoke(args).await,
        }
    }
}
