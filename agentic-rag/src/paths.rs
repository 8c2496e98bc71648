//! Platform directory resolution.
//!
//! | Purpose | Linux | macOS | Windows |
//! |---------|-------|-------|---------|
//! | Config | `~/.config/agentic-rag/` | `~/Library/Application Support/agentic-rag/` | `%APPDATA%\agentic-rag\` |
//! | Data | `~/.local/share/agentic-rag/` | `~/Library/Application Support/agentic-rag/data/` | `%LOCALAPPDATA%\agentic-rag\data\` |
//!
//! Directories handed to the model (retrieved data, charts) are made
//! absolute so generated code can use them from any working directory.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

const APP_NAME: &str = "agentic-rag";

/// A directory that passed a write probe.
#[derive(Debug, Clone)]
pub struct WritableDir {
    pub path: PathBuf,
    /// Whether the primary location was rejected
    pub is_fallback: bool,
}

pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join(APP_NAME))
        .unwrap_or_else(|| fallback_base_dir().join("config"))
}

pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|p| p.join(APP_NAME).join("data"))
        .unwrap_or_else(|| fallback_base_dir().join("data"))
}

/// Settings file used when `--config` is not given.
pub fn default_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// Parent of the per-session sandbox directories.
pub fn default_workspace_dir() -> PathBuf {
    get_data_dir().join("sandbox")
}

/// Downloaded embedding model files.
pub fn default_embedding_cache_dir() -> PathBuf {
    get_data_dir().join("models")
}

/// `~/.agentic-rag/`, or `./.agentic-rag/` without a home directory.
fn fallback_base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|p| p.join(".agentic-rag"))
        .unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".agentic-rag")
        })
}

/// Resolve `path` against the current directory when relative.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

async fn test_write_access(dir: &Path) -> bool {
    if fs::create_dir_all(dir).await.is_err() {
        return false;
    }
    let probe = dir.join(format!(".write-test-{}", Uuid::new_v4()));
    match fs::write(&probe, b"test").await {
        Ok(_) => {
            let _ = fs::remove_file(&probe).await;
            true
        }
        Err(_) => false,
    }
}

/// First writable directory of: `primary`, `~/.agentic-rag/{purpose}/`,
/// `./.agentic-rag/{purpose}/`.
pub async fn ensure_writable_dir(primary: PathBuf, purpose: &str) -> io::Result<WritableDir> {
    if test_write_access(&primary).await {
        info!("[Paths] Using {:?} for {}", primary, purpose);
        return Ok(WritableDir {
            path: primary,
            is_fallback: false,
        });
    }
    warn!("[Paths] {:?} is not writable for {}", primary, purpose);

    let candidates = [
        dirs::home_dir().map(|home| home.join(".agentic-rag").join(purpose)),
        std::env::current_dir()
            .ok()
            .map(|cwd| cwd.join(".agentic-rag").join(purpose)),
    ];
    for candidate in candidates.into_iter().flatten() {
        if test_write_access(&candidate).await {
            warn!("[Paths] Using fallback {:?} for {}", candidate, purpose);
            return Ok(WritableDir {
                path: candidate,
                is_fallback: true,
            });
        }
    }

    Err(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("no writable directory for {}", purpose),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_dirs_name_the_app() {
        assert!(get_config_dir().to_string_lossy().contains("agentic-rag"));
        assert!(get_data_dir().to_string_lossy().contains("agentic-rag"));
        assert!(default_settings_path().ends_with("settings.json"));
    }

    #[test]
    fn test_absolutize() {
        let abs = absolutize(Path::new("retrieved_data"));
        assert!(abs.is_absolute());
        assert!(abs.ends_with("retrieved_data"));
        let already = std::env::temp_dir();
        assert_eq!(absolutize(&already), already);
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_primary_success() {
        let temp = tempfile::tempdir().unwrap();
        let primary = temp.path().join("sessions");
        let result = ensure_writable_dir(primary.clone(), "sandbox").await.unwrap();
        assert!(!result.is_fallback);
        assert_eq!(result.path, primary);
        assert!(primary.is_dir());
    }
}
