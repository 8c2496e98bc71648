use serde::{Deserialize, Serialize};

// ============ Conversation ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of a loop conversation. Conversations are append-only and live
/// only as long as the loop that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }
}

// ============ Model Responses ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

// ============ Execution ============

/// What an executor (sandbox, query runner, tool dispatch) reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionObservation {
    pub output: Option<String>,
    pub error: Option<String>,
    /// Files produced by this execution, in creation order
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl ExecutionObservation {
    pub fn output(text: impl Into<String>) -> Self {
        Self {
            output: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            error: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_artifacts(mut self, artifacts: Vec<String>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// Non-empty output text, if any.
    pub fn output_text(&self) -> Option<&str> {
        self.output.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Non-empty error text, if any.
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().filter(|s| !s.trim().is_empty())
    }
}

/// Ordered, de-duplicated collection of artifact references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(Vec<String>);

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, artifact: impl Into<String>) -> bool {
        let artifact = artifact.into();
        if self.0.contains(&artifact) {
            return false;
        }
        self.0.push(artifact);
        true
    }

    pub fn extend<I, S>(&mut self, artifacts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for artifact in artifacts {
            self.insert(artifact);
        }
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, artifact: &str) -> bool {
        self.0.iter().any(|a| a == artifact)
    }
}

// ============ Datasets ============

/// Storage format a dataset lives in; retrievers declare the one they work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Text,
    Table,
    ExternalDb,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Text => "text",
            DataFormat::Table => "table",
            DataFormat::ExternalDb => "external_db",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub description: String,
    pub format: DataFormat,
}
