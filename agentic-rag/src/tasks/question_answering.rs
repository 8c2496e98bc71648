use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::info;

use crate::error::{LlmError, ToolError};
use crate::llm::LlmClient;
use crate::prompts::QA_PROMPT;
use crate::protocol::Message;
use crate::tool_registry::{str_arg, ArgType, ArgumentSpec, ToolArgs, ToolOutput};

pub const NAME: &str = "question_answering";

pub const DESCRIPTION: &str = "This task is capable of answering questions based on given file content. It takes a query and file path as input and returns the answer.";

pub const ARGUMENTS: [ArgumentSpec; 2] = [
    ArgumentSpec::required("query", ArgType::String, "Question to answer"),
    ArgumentSpec::required("file_path", ArgType::String, "Path of the text file holding the context"),
];

/// Answers from the whole content of one text file in a single model call.
pub struct QuestionAnsweringTask {
    llm: Arc<dyn LlmClient>,
    llm_timeout: Duration,
}

impl QuestionAnsweringTask {
    pub fn new(llm: Arc<dyn LlmClient>, llm_timeout: Duration) -> Self {
        Self { llm, llm_timeout }
    }

    pub async fn invoke(&self, args: &ToolArgs) -> Result<ToolOutput, ToolError> {
        let query = str_arg(args, "query")?;
        let file_path = str_arg(args, "file_path")?;

        let context = tokio::fs::read_to_string(file_path).await?;
        info!(
            "[QuestionAnswering] {} chars of context from {}",
            context.len(),
            file_path
        );

        let messages = [
            Message::system(QA_PROMPT),
            Message::user(format!("Context:\n{}\n\nQuestion: {}", context, query)),
        ];
        let response = timeout(self.llm_timeout, self.llm.invoke(&messages))
            .await
            .map_err(|_| LlmError::Timeout(self.llm_timeout))??;

        Ok(ToolOutput::text(response.content).with_usage(response.usage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::ScriptedLlm;
    use serde_json::json;

    #[tokio::test]
    async fn test_answers_from_file_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text_data.txt");
        tokio::fs::write(&path, "The office opens at 9am.").await.unwrap();

        let llm = Arc::new(ScriptedLlm::new(["It opens at 9am."]));
        let task = QuestionAnsweringTask::new(llm.clone(), Duration::from_secs(5));
        let args = json!({"query": "When does it open?", "file_path": path.to_str().unwrap()});
        let output = task.invoke(args.as_object().unwrap()).await.unwrap();

        assert_eq!(output.content, "It opens at 9am.");
        let sent = &llm.calls()[0];
        assert_eq!(sent[0].content, QA_PROMPT);
        assert_eq!(
            sent[1].content,
            "Context:\nThe office opens at 9am.\n\nQuestion: When does it open?"
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_tool_error() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let task = QuestionAnsweringTask::new(llm.clone(), Duration::from_secs(5));
        let args = json!({"query": "q", "file_path": "/nonexistent/ctx-81b2.txt"});
        let err = task.invoke(args.as_object().unwrap()).await.unwrap_err();
        assert!(matches!(err, ToolError::Io(_)));
        assert_eq!(llm.call_count(), 0);
    }
}
