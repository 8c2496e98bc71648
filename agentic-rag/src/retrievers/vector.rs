use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::error::ToolError;
use crate::stores::TextSearch;
use crate::tool_registry::{str_arg, ArgType, ArgumentSpec, ToolArgs, ToolOutput};

pub const NAME: &str = "vector_search_retriever";

pub const DESCRIPTION: &str = "This retriever requires a user query in the input and retrieves relevant text chunks by doing vector search from database. It then saves those chunks in `retrieved_data/text_data.txt`.";

pub const ARGUMENTS: [ArgumentSpec; 1] = [ArgumentSpec::required(
    "query",
    ArgType::String,
    "Query to search relevant text for",
)];

const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

pub struct VectorRetriever {
    search: Arc<dyn TextSearch>,
    top_k: usize,
    retrieved_dir: PathBuf,
}

impl VectorRetriever {
    pub fn new(search: Arc<dyn TextSearch>, top_k: usize, retrieved_dir: impl Into<PathBuf>) -> Self {
        Self {
            search,
            top_k,
            retrieved_dir: retrieved_dir.into(),
        }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let query = str_arg(args, "query")?;
        let chunks = self.search.knn_search(query, self.top_k).await?;
        info!("[VectorRetriever] {} chunks for `{}`", chunks.len(), query);

        if chunks.is_empty() {
            return Ok(ToolOutput::text("Unable to retrieve any relevant text"));
        }

        let content = chunks
            .iter()
            .map(|c| c.content.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR);
        tokio::fs::create_dir_all(&self.retrieved_dir).await?;
        let path = self.retrieved_dir.join("text_data.txt");
        tokio::fs::write(&path, content).await?;

        Ok(ToolOutput::text(format!(
            "Relevant text content saved at `{}`",
            path.display()
        )))
    }
}
