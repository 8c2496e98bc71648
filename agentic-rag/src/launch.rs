//! Assembles the concrete collaborators into a `Controller`.
//!
//! The orchestration core only sees traits; this is the one place that
//! picks the OpenAI-compatible client, the local Python sandbox, the
//! manifest catalog, the fastembed text index and the SQLite runner.

use std::sync::Arc;

use tracing::{info, warn};

use crate::code_agent::CodeRuntime;
use crate::controller::Controller;
use crate::error::{AgentError, ConfigError};
use crate::llm::{LlmClient, OpenAiClient, OpenAiClientConfig};
use crate::paths::{
    absolutize, default_embedding_cache_dir, default_workspace_dir, ensure_writable_dir,
};
use crate::retrievers::{Retriever, SqlRetriever, TableDataRetriever, VectorRetriever};
use crate::sandbox::LocalPythonProvider;
use crate::settings::AgentSettings;
use crate::stores::{Embedder, FastEmbedder, Manifest};
use crate::tasks::{ChartGenerationTask, QuestionAnsweringTask, TableQueryTask, Task};

/// Model client described by the `llm` and `retry` settings. The API key is
/// optional; local endpoints usually run without one.
pub fn build_llm(settings: &AgentSettings) -> Result<Arc<dyn LlmClient>, AgentError> {
    let api_key = std::env::var(&settings.llm.api_key_env).ok();
    if api_key.is_none() {
        warn!(
            "[Launch] {} is not set; calling {} without an API key",
            settings.llm.api_key_env, settings.llm.base_url
        );
    }
    let client = OpenAiClient::new(OpenAiClientConfig {
        base_url: settings.llm.base_url.clone(),
        model: settings.llm.model.clone(),
        api_key,
        temperature: settings.llm.temperature,
        request_timeout: settings.llm_timeout(),
        retry: settings.retry_policy(),
    })?;
    Ok(Arc::new(client))
}

/// Local sentence embedder; the model loads on first use.
pub fn build_embedder(settings: &AgentSettings) -> Arc<dyn Embedder> {
    let cache_dir = settings
        .retrieval
        .embedding_cache_dir
        .clone()
        .unwrap_or_else(default_embedding_cache_dir);
    Arc::new(FastEmbedder::new(cache_dir))
}

/// Wire every task and retriever over `manifest`.
pub async fn build_controller(
    settings: &AgentSettings,
    manifest: Manifest,
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
) -> Result<Controller, AgentError> {
    let workspace_primary = settings
        .paths
        .workspace_dir
        .clone()
        .unwrap_or_else(default_workspace_dir);
    let workspace = ensure_writable_dir(workspace_primary, "sandbox")
        .await
        .map_err(|e| ConfigError::Invalid {
            field: "paths.workspace_dir",
            message: e.to_string(),
        })?;
    let sandboxes = Arc::new(
        LocalPythonProvider::new(settings.sandbox.python.clone(), workspace.path)
            .with_install_missing(settings.sandbox.install_missing),
    );

    let retrieved_dir = absolutize(&settings.paths.retrieved_data_dir);
    let charts_dir = absolutize(&settings.paths.charts_dir);
    let loops = &settings.loops;

    let runtime = CodeRuntime {
        llm: llm.clone(),
        sandboxes,
        loop_settings: settings.loop_settings(loops.code_max_iterations),
        retry: settings.retry_policy(),
    };

    let manifest = Arc::new(manifest);
    let text_index = Arc::new(manifest.text_index(embedder).await?);
    info!("[Launch] Indexed {} text chunks", text_index.len());
    let databases = Arc::new(manifest.databases());

    let tasks = vec![
        Task::QuestionAnswering(QuestionAnsweringTask::new(
            llm.clone(),
            settings.loop_settings(1).llm_timeout,
        )),
        Task::ChartGeneration(ChartGenerationTask::new(
            runtime.clone(),
            charts_dir,
            loops.code_max_iterations,
        )),
        Task::TableQuery(TableQueryTask::new(
            runtime.clone(),
            manifest.clone(),
            loops.code_max_iterations,
        )),
    ];
    let retrievers = vec![
        Retriever::Vector(VectorRetriever::new(
            text_index,
            settings.retrieval.top_k,
            retrieved_dir.clone(),
        )),
        Retriever::TableData(TableDataRetriever::new(
            runtime,
            manifest.clone(),
            retrieved_dir.clone(),
            loops.table_extraction_max_iterations,
        )),
        Retriever::Sql(SqlRetriever::new(
            databases,
            llm.clone(),
            settings.loop_settings(loops.sql_max_retries),
            retrieved_dir,
        )),
    ];

    Controller::new(
        llm,
        manifest,
        tasks,
        retrievers,
        settings.loop_settings(loops.controller_max_iterations),
    )
}
