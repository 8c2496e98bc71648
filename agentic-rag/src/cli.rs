//! Command-line arguments and the one-shot query run behind them.

use std::path::{Path, PathBuf};

use clap::Parser;
use tracing::{info, warn};

use crate::controller::ControllerResponse;
use crate::error::{AgentError, ConfigError};
use crate::launch::{build_controller, build_embedder, build_llm};
use crate::paths::default_settings_path;
use crate::settings::{load_settings, save_settings, validate_settings, AgentSettings};
use crate::stores::Manifest;

/// CLI arguments for agentic-rag
#[derive(Parser, Debug, Clone)]
#[command(
    name = "agentic-rag",
    about = "Answer a question from text, table and database sources"
)]
pub struct CliArgs {
    /// Question to answer (string or @path/to/file)
    #[arg(long, value_name = "QUERY_OR_@FILE", env = "AGENTIC_RAG_QUERY")]
    pub query: String,
    /// Dataset manifest JSON
    #[arg(long, value_name = "PATH", env = "AGENTIC_RAG_MANIFEST")]
    pub manifest: Option<PathBuf>,
    /// Settings file (defaults to the platform config dir)
    #[arg(long, value_name = "PATH", env = "AGENTIC_RAG_CONFIG")]
    pub config: Option<PathBuf>,
    /// Override the model name
    #[arg(long, value_name = "MODEL", env = "AGENTIC_RAG_MODEL")]
    pub model: Option<String>,
    /// Override the OpenAI-compatible endpoint
    #[arg(long, value_name = "URL", env = "AGENTIC_RAG_BASE_URL")]
    pub base_url: Option<String>,
    /// Override the controller's iteration budget
    #[arg(long, value_name = "INT", env = "AGENTIC_RAG_MAX_ITERATIONS")]
    pub max_iterations: Option<usize>,
    /// Print the whole response as JSON
    #[arg(long, env = "AGENTIC_RAG_JSON")]
    pub json: bool,
    /// Write the effective settings (file plus overrides) back to the settings path
    #[arg(long)]
    pub save_config: bool,
}

/// Read a value that may be either a literal string or a @path reference to a file.
pub fn read_value_or_file(raw: &str) -> Result<String, ConfigError> {
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        }),
        None => Ok(raw.to_string()),
    }
}

/// Apply launch-time overrides on top of the loaded settings.
pub fn apply_cli_overrides(args: &CliArgs, settings: &mut AgentSettings) {
    if let Some(model) = &args.model {
        info!("[Launch] Model override: {}", model);
        settings.llm.model = model.clone();
    }
    if let Some(base_url) = &args.base_url {
        info!("[Launch] Endpoint override: {}", base_url);
        settings.llm.base_url = base_url.clone();
    }
    if let Some(max_iterations) = args.max_iterations {
        info!("[Launch] Controller budget override: {}", max_iterations);
        settings.loops.controller_max_iterations = max_iterations;
    }
}

/// Settings file plus overrides, validated. Persisted when `--save-config` is set.
pub async fn prepare_settings(args: &CliArgs) -> Result<AgentSettings, ConfigError> {
    let config_path = args.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&config_path).await?;
    apply_cli_overrides(args, &mut settings);
    validate_settings(&settings)?;
    if args.save_config {
        save_settings(&config_path, &settings).await?;
    }
    Ok(settings)
}

/// Load everything `args` points at and answer the query.
pub async fn run(args: &CliArgs) -> Result<ControllerResponse, AgentError> {
    let query = read_value_or_file(&args.query)?;
    let settings = prepare_settings(args).await?;

    let manifest = match &args.manifest {
        Some(path) => Manifest::load(&crate::paths::absolutize(path)).await?,
        None => {
            warn!("[Launch] No --manifest given; no datasets are available");
            Manifest::default()
        }
    };

    let llm = build_llm(&settings)?;
    let embedder = build_embedder(&settings);
    let controller = build_controller(&settings, manifest, llm, embedder).await?;
    controller.invoke(query.trim()).await
}

/// Human-readable rendering: the answer, then any artifacts.
pub fn render_response(response: &ControllerResponse) -> String {
    let mut out = response.content.clone();
    if !response.artifacts.is_empty() {
        out.push_str("\n\nArtifacts:");
        for artifact in &response.artifacts {
            out.push_str(&format!("\n  - {}", artifact));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_args() {
        let args = CliArgs::try_parse_from([
            "agentic-rag",
            "--query",
            "How many orders?",
            "--manifest",
            "data/manifest.json",
            "--max-iterations",
            "4",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.query, "How many orders?");
        assert_eq!(args.manifest, Some(PathBuf::from("data/manifest.json")));
        assert_eq!(args.max_iterations, Some(4));
        assert!(args.json);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "agentic-rag",
            "--query",
            "q",
            "--model",
            "qwen2.5",
            "--base-url",
            "http://localhost:11434/v1",
        ])
        .unwrap();
        let mut settings = AgentSettings::default();
        apply_cli_overrides(&args, &mut settings);
        assert_eq!(settings.llm.model, "qwen2.5");
        assert_eq!(settings.llm.base_url, "http://localhost:11434/v1");
        assert_eq!(settings.loops.controller_max_iterations, 10);
    }

    #[test]
    fn test_read_value_or_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.txt");
        std::fs::write(&path, "Which region sold most?").unwrap();
        assert_eq!(
            read_value_or_file(&format!("@{}", path.display())).unwrap(),
            "Which region sold most?"
        );
        assert_eq!(read_value_or_file("plain").unwrap(), "plain");
        assert!(read_value_or_file("@/nonexistent/q-19c.txt").is_err());
    }

    #[tokio::test]
    async fn test_save_config_persists_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("settings.json");
        let config_arg = config.display().to_string();
        let args = CliArgs::try_parse_from([
            "agentic-rag",
            "--query",
            "q",
            "--config",
            config_arg.as_str(),
            "--model",
            "qwen2.5",
            "--save-config",
        ])
        .unwrap();

        let settings = prepare_settings(&args).await.unwrap();
        assert_eq!(settings.llm.model, "qwen2.5");
        assert_eq!(load_settings(&config).await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_settings_not_written_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("settings.json");
        let config_arg = config.display().to_string();
        let args =
            CliArgs::try_parse_from(["agentic-rag", "--query", "q", "--config", config_arg.as_str()])
                .unwrap();

        prepare_settings(&args).await.unwrap();
        assert!(!config.exists());
    }

    #[test]
    fn test_render_response_lists_artifacts() {
        let response = ControllerResponse {
            success: true,
            content: "North leads.".to_string(),
            artifacts: vec!["/tmp/charts/a.png".to_string()],
            ..Default::default()
        };
        assert_eq!(
            render_response(&response),
            "North leads.\n\nArtifacts:\n  - /tmp/charts/a.png"
        );
    }
}
