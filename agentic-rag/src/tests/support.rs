//! Scripted collaborators shared by unit and flow tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::code_agent::CodeRuntime;
use crate::error::{LlmError, SandboxError, StoreError};
use crate::execution_loop::LoopSettings;
use crate::llm::{LlmClient, RetryPolicy};
use crate::protocol::{DatasetDescriptor, ExecutionObservation, LlmResponse, Message, TokenUsage};
use crate::sandbox::{Sandbox, SandboxProvider, SandboxSpec};
use crate::stores::embedding::Embedder;
use crate::stores::{
    DatasetCatalog, DbStructure, ExternalDatabases, QueryRows, TableCatalog, TableRecord,
    TextChunk, TextSearch,
};

/// Usage reported for every scripted reply.
pub const CALL_USAGE: TokenUsage = TokenUsage {
    prompt_tokens: 10,
    completion_tokens: 5,
    total_tokens: 15,
};

// ========== LLM ==========

/// Replies from a fixed script, recording every conversation it was sent.
/// Without a fallback, a call past the end of the script fails.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(&self, messages: &[Message]) -> Result<LlmResponse, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let next = self.replies.lock().unwrap().pop_front();
        match next.or_else(|| self.fallback.clone()) {
            Some(content) => Ok(LlmResponse {
                content,
                usage: CALL_USAGE,
            }),
            None => Err(LlmError::Transport("script exhausted".to_string())),
        }
    }
}

// ========== Sandbox ==========

type Script = Arc<Mutex<VecDeque<Result<ExecutionObservation, SandboxError>>>>;

/// Returns scripted results in order and records the code it was given.
/// Once the script runs out every run prints nothing.
pub struct ScriptedSandbox {
    script: Script,
    executed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSandbox {
    pub fn new(results: Vec<Result<ExecutionObservation, SandboxError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(results.into())),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for ScriptedSandbox {
    async fn run(&mut self, code: &str) -> Result<ExecutionObservation, SandboxError> {
        self.executed.lock().unwrap().push(code.to_string());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ExecutionObservation::output("")))
    }
}

/// Hands out sandboxes that share one script and one execution log.
pub struct ScriptedSandboxProvider {
    template: ScriptedSandbox,
    specs: Mutex<Vec<SandboxSpec>>,
}

impl ScriptedSandboxProvider {
    pub fn new(results: Vec<Result<ExecutionObservation, SandboxError>>) -> Self {
        Self {
            template: ScriptedSandbox::new(results),
            specs: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.template.executed()
    }

    pub fn specs(&self) -> Vec<SandboxSpec> {
        self.specs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxProvider for ScriptedSandboxProvider {
    async fn open(&self, spec: SandboxSpec) -> Result<Box<dyn Sandbox>, SandboxError> {
        self.specs.lock().unwrap().push(spec);
        Ok(Box::new(ScriptedSandbox {
            script: self.template.script.clone(),
            executed: self.template.executed.clone(),
        }))
    }
}

/// Code runtime with fast timeouts and no sandbox backoff.
pub fn code_runtime(llm: Arc<dyn LlmClient>, sandboxes: Arc<dyn SandboxProvider>) -> CodeRuntime {
    CodeRuntime {
        llm,
        sandboxes,
        loop_settings: LoopSettings {
            max_iterations: 10,
            llm_timeout: Duration::from_secs(5),
            execution_timeout: Duration::from_secs(5),
        },
        retry: RetryPolicy::none(),
    }
}

// ========== Stores ==========

pub struct MemoryCatalog {
    datasets: Vec<DatasetDescriptor>,
}

impl MemoryCatalog {
    pub fn new(datasets: Vec<DatasetDescriptor>) -> Self {
        Self { datasets }
    }
}

#[async_trait]
impl DatasetCatalog for MemoryCatalog {
    async fn list_all(&self) -> Result<Vec<DatasetDescriptor>, StoreError> {
        Ok(self.datasets.clone())
    }
}

pub struct MemoryTables {
    records: Vec<TableRecord>,
}

impl MemoryTables {
    pub fn new(records: Vec<TableRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl TableCatalog for MemoryTables {
    async fn fetch(&self, name: &str) -> Result<Option<TableRecord>, StoreError> {
        Ok(self.records.iter().find(|r| r.name == name).cloned())
    }
}

/// Returns the first `k` chunks with descending scores, whatever the query.
pub struct MemoryText {
    chunks: Vec<String>,
}

impl MemoryText {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl TextSearch for MemoryText {
    async fn knn_search(&self, _query: &str, k: usize) -> Result<Vec<TextChunk>, StoreError> {
        Ok(self
            .chunks
            .iter()
            .take(k)
            .enumerate()
            .map(|(i, content)| TextChunk {
                content: content.clone(),
                score: 1.0 / (i as f32 + 1.0),
            })
            .collect())
    }
}

/// One named database with scripted query results. `Err` entries become
/// database errors; past the end of the script queries return no rows.
pub struct MemoryDatabases {
    name: String,
    structure: DbStructure,
    results: Mutex<VecDeque<Result<QueryRows, String>>>,
    executed: Mutex<Vec<String>>,
}

impl MemoryDatabases {
    pub fn new(name: impl Into<String>, structure: DbStructure) -> Self {
        Self {
            name: name.into(),
            structure,
            results: Mutex::new(VecDeque::new()),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(self, result: Result<QueryRows, String>) -> Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn check(&self, db_name: &str) -> Result<(), StoreError> {
        if db_name == self.name {
            Ok(())
        } else {
            Err(StoreError::NotFound {
                kind: "database",
                name: db_name.to_string(),
            })
        }
    }
}

#[async_trait]
impl ExternalDatabases for MemoryDatabases {
    async fn structure(&self, db_name: &str) -> Result<DbStructure, StoreError> {
        self.check(db_name)?;
        Ok(self.structure.clone())
    }

    async fn run_read_query(&self, db_name: &str, sql: &str) -> Result<QueryRows, StoreError> {
        self.check(db_name)?;
        self.executed.lock().unwrap().push(sql.to_string());
        let next = self.results.lock().unwrap().pop_front();
        match next {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(message)) => Err(StoreError::Database(message)),
            None => Ok(QueryRows::default()),
        }
    }
}

// ========== Embeddings ==========

/// Synonym groups; each is one axis of the embedding space.
const CONCEPTS: &[&[&str]] = &[
    &["staff", "employee", "employees", "worker", "workers"],
    &["leave", "vacation", "holiday", "holidays"],
    &["policy", "policies", "rule", "rules"],
    &["wind", "turbine", "turbines"],
    &["solar", "sunlight", "panels"],
];

/// Deterministic embedder: synonyms share an axis, every other word lands
/// on one extra axis. Records the size of every batch it embeds.
pub struct ConceptEmbedder {
    fail: bool,
    batches: Mutex<Vec<usize>>,
}

impl ConceptEmbedder {
    pub fn new() -> Self {
        Self {
            fail: false,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn batches(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; CONCEPTS.len() + 1];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            let axis = CONCEPTS
                .iter()
                .position(|group| group.contains(&word.as_str()))
                .unwrap_or(CONCEPTS.len());
            vector[axis] += 1.0;
        }
        vector
    }
}

impl Embedder for ConceptEmbedder {
    fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, StoreError> {
        self.batches.lock().unwrap().push(texts.len());
        if self.fail {
            return Err(StoreError::Embedding("model unavailable".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}
