//! Settings file for the CLI and the wiring it performs.
//!
//! Every field has a serde default, so a partial file (or no file at all)
//! yields a complete `AgentSettings`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::execution_loop::LoopSettings;
use crate::llm::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default)]
    pub llm: LlmSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub loops: LoopLimits,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

// ============ Groups ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Backoff for rate-limited model and sandbox calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_wait_ms() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_wait_secs() -> u64 {
    32
}

fn default_max_attempts() -> u32 {
    8
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_wait_ms: default_initial_wait_ms(),
            multiplier: default_multiplier(),
            max_wait_secs: default_max_wait_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopLimits {
    #[serde(default = "default_iterations")]
    pub controller_max_iterations: usize,
    #[serde(default = "default_iterations")]
    pub code_max_iterations: usize,
    #[serde(default = "default_iterations")]
    pub table_extraction_max_iterations: usize,
    /// Generation attempts of the SQL loop; 1 means a single attempt
    #[serde(default = "default_sql_max_retries")]
    pub sql_max_retries: usize,
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
}

fn default_iterations() -> usize {
    10
}

fn default_sql_max_retries() -> usize {
    3
}

fn default_execution_timeout_secs() -> u64 {
    120
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            controller_max_iterations: default_iterations(),
            code_max_iterations: default_iterations(),
            table_extraction_max_iterations: default_iterations(),
            sql_max_retries: default_sql_max_retries(),
            execution_timeout_secs: default_execution_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "default_retrieved_data_dir")]
    pub retrieved_data_dir: PathBuf,
    #[serde(default = "default_charts_dir")]
    pub charts_dir: PathBuf,
    /// Parent of sandbox session directories; platform data dir when unset
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
}

fn default_retrieved_data_dir() -> PathBuf {
    PathBuf::from("retrieved_data")
}

fn default_charts_dir() -> PathBuf {
    PathBuf::from("charts")
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            retrieved_data_dir: default_retrieved_data_dir(),
            charts_dir: default_charts_dir(),
            workspace_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxSettings {
    #[serde(default = "default_python")]
    pub python: String,
    /// `pip install` libraries the interpreter cannot import
    #[serde(default)]
    pub install_missing: bool,
}

fn default_python() -> String {
    "python3".to_string()
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            python: default_python(),
            install_missing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Embedding model cache; platform data dir when unset
    #[serde(default)]
    pub embedding_cache_dir: Option<PathBuf>,
}

fn default_top_k() -> usize {
    5
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            embedding_cache_dir: None,
        }
    }
}

// ============ Derived values ============

impl AgentSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_wait: Duration::from_millis(self.retry.initial_wait_ms),
            multiplier: self.retry.multiplier,
            max_wait: Duration::from_secs(self.retry.max_wait_secs),
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.request_timeout_secs)
    }

    /// Loop settings sharing the configured timeouts.
    pub fn loop_settings(&self, max_iterations: usize) -> LoopSettings {
        LoopSettings {
            max_iterations,
            // the client retries 429s internally
            llm_timeout: self.retry_policy().worst_case(self.llm_timeout()),
            execution_timeout: Duration::from_secs(self.loops.execution_timeout_secs),
        }
    }
}

// ============ Persistence ============

/// Load settings from `path`. A missing file yields defaults.
pub async fn load_settings(path: &Path) -> Result<AgentSettings, ConfigError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("[Settings] No settings file at {:?}, using defaults", path);
            return Ok(AgentSettings::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let settings: AgentSettings =
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    validate_settings(&settings)?;
    info!("[Settings] Loaded from {:?}", path);
    Ok(settings)
}

pub async fn save_settings(path: &Path, settings: &AgentSettings) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(write_error)?;
    }
    let contents = serde_json::to_string_pretty(settings).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    fs::write(path, contents).await.map_err(write_error)?;

    info!("[Settings] Saved to {:?}", path);
    Ok(())
}

/// Reject zero budgets and unusable backoff values.
pub fn validate_settings(settings: &AgentSettings) -> Result<(), ConfigError> {
    let invalid = |field, message: &str| {
        Err(ConfigError::Invalid {
            field,
            message: message.to_string(),
        })
    };

    let budgets = [
        ("loops.controller_max_iterations", settings.loops.controller_max_iterations),
        ("loops.code_max_iterations", settings.loops.code_max_iterations),
        (
            "loops.table_extraction_max_iterations",
            settings.loops.table_extraction_max_iterations,
        ),
        ("loops.sql_max_retries", settings.loops.sql_max_retries),
        ("retrieval.top_k", settings.retrieval.top_k),
    ];
    for (field, value) in budgets {
        if value == 0 {
            return invalid(field, "must be at least 1");
        }
    }

    if !(settings.retry.multiplier > 1.0) {
        return invalid("retry.multiplier", "must be greater than 1.0");
    }
    if settings.retry.initial_wait_ms == 0 {
        return invalid("retry.initial_wait_ms", "must be positive");
    }
    if settings.retry.max_wait_secs == 0 {
        return invalid("retry.max_wait_secs", "must be positive");
    }
    if settings.llm.request_timeout_secs == 0 {
        return invalid("llm.request_timeout_secs", "must be positive");
    }
    if settings.loops.execution_timeout_secs == 0 {
        return invalid("loops.execution_timeout_secs", "must be positive");
    }
    if settings.llm.model.trim().is_empty() {
        return invalid("llm.model", "must not be empty");
    }
    Ok(())
}
