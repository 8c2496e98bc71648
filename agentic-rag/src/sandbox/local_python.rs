//! Local Python sandbox backed by a persistent child interpreter.
//!
//! A small driver script runs inside `python -u -c` and executes one JSON
//! request per stdin line in a shared namespace, so variables survive across
//! `run` calls. Each reply is a single stdout line tagged with
//! `__AGENTIC_RAG_RESULT__`. Every session gets its own working directory
//! under the workspace root; relative input files are staged there.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Sandbox, SandboxProvider, SandboxSpec};
use crate::error::SandboxError;
use crate::protocol::ExecutionObservation;

const RESULT_MARKER: &str = "__AGENTIC_RAG_RESULT__";

const DRIVER: &str = r#"
import contextlib, io, json, os, sys, traceback

_MARKER = "__AGENTIC_RAG_RESULT__"
_IMAGE_EXT = (".png", ".jpg", ".jpeg")
_WATCH = [d for d in os.environ.get("AGENTIC_RAG_WATCH_DIRS", "").split(os.pathsep) if d] or [os.getcwd()]
_real_stdout = sys.stdout


def _snapshot():
    seen = {}
    for root in _WATCH:
        if not os.path.isdir(root):
            continue
        for base, _dirs, files in os.walk(root):
            for name in files:
                if name.lower().endswith(_IMAGE_EXT):
                    path = os.path.abspath(os.path.join(base, name))
                    try:
                        seen[path] = os.path.getmtime(path)
                    except OSError:
                        pass
    return seen


def _reply(output, error, artifacts):
    _real_stdout.write(_MARKER + json.dumps({"output": output, "error": error, "artifacts": artifacts}) + "\n")
    _real_stdout.flush()


_namespace = {"__name__": "__main__"}

while True:
    _line = sys.stdin.readline()
    if not _line:
        break
    _line = _line.strip()
    if not _line:
        continue
    try:
        _code = json.loads(_line)["code"]
    except Exception as exc:
        _reply(None, "invalid request: %s" % exc, [])
        continue
    _before = _snapshot()
    _buffer = io.StringIO()
    _error = None
    with contextlib.redirect_stdout(_buffer), contextlib.redirect_stderr(_buffer):
        try:
            exec(compile(_code, "<agent>", "exec"), _namespace)
        except BaseException:
            _error = traceback.format_exc()
    _after = _snapshot()
    _new = sorted((p for p, m in _after.items() if _before.get(p) != m), key=lambda p: _after[p])
    _printed = _buffer.getvalue()
    if _error is None:
        _reply(_printed, None, _new)
    else:
        _reply(None, _printed + "Executing code yielded an error:\n" + _error, _new)
"#;

const FIND_MISSING: &str = "import importlib.util, sys\n\
print(','.join(m for m in sys.argv[1:] if importlib.util.find_spec(m) is None))";

/// Opens `LocalPythonSandbox` sessions.
#[derive(Debug, Clone)]
pub struct LocalPythonProvider {
    python: String,
    workspace_root: PathBuf,
    install_missing: bool,
}

impl LocalPythonProvider {
    pub fn new(python: impl Into<String>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            workspace_root: workspace_root.into(),
            install_missing: false,
        }
    }

    /// Run `pip install` for libraries the interpreter cannot import.
    pub fn with_install_missing(mut self, install_missing: bool) -> Self {
        self.install_missing = install_missing;
        self
    }
}

#[async_trait]
impl SandboxProvider for LocalPythonProvider {
    async fn open(&self, spec: SandboxSpec) -> Result<Box<dyn Sandbox>, SandboxError> {
        let sandbox = LocalPythonSandbox::start(
            &self.python,
            &self.workspace_root,
            spec,
            self.install_missing,
        )
        .await?;
        Ok(Box::new(sandbox))
    }
}

struct PythonProcess {
    // Held so the interpreter is killed when the process handle goes away
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

#[derive(Deserialize)]
struct DriverReply {
    output: Option<String>,
    error: Option<String>,
    #[serde(default)]
    artifacts: Vec<String>,
}

pub struct LocalPythonSandbox {
    python: String,
    session_dir: PathBuf,
    artifacts_dir: Option<PathBuf>,
    process: Option<PythonProcess>,
    /// Set while a request is outstanding. Still set on entry means the
    /// previous call was cancelled mid-reply and the stream is out of sync.
    in_flight: bool,
}

impl LocalPythonSandbox {
    async fn start(
        python: &str,
        workspace_root: &Path,
        spec: SandboxSpec,
        install_missing: bool,
    ) -> Result<Self, SandboxError> {
        let session_dir = workspace_root.join(format!("session-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&session_dir).await?;
        stage_inputs(&session_dir, &spec.input_files).await?;
        if let Some(dir) = &spec.artifacts_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        ensure_libraries(python, &spec.extra_libraries, install_missing).await;

        let mut sandbox = Self {
            python: python.to_string(),
            session_dir,
            artifacts_dir: spec.artifacts_dir,
            process: None,
            in_flight: false,
        };
        sandbox.process = Some(sandbox.spawn()?);
        info!(
            "[Sandbox] Started Python session in {}",
            sandbox.session_dir.display()
        );
        Ok(sandbox)
    }

    fn spawn(&self) -> Result<PythonProcess, SandboxError> {
        let mut watch = vec![self.session_dir.clone()];
        if let Some(dir) = &self.artifacts_dir {
            watch.push(absolute(dir));
        }
        let watch_dirs: OsString = std::env::join_paths(watch)
            .map_err(|e| SandboxError::Startup(format!("invalid watch path: {}", e)))?;

        let mut child = Command::new(&self.python)
            .arg("-u")
            .arg("-c")
            .arg(DRIVER)
            .current_dir(&self.session_dir)
            .env("MPLBACKEND", "Agg")
            .env("AGENTIC_RAG_WATCH_DIRS", watch_dirs)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Startup(format!("{}: {}", self.python, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Startup("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Startup("stdout not captured".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[Sandbox] python stderr: {}", line);
                }
            });
        }

        Ok(PythonProcess {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn exchange(&mut self, code: &str) -> Result<DriverReply, SandboxError> {
        let process = self
            .process
            .as_mut()
            .ok_or_else(|| SandboxError::SessionClosed("no interpreter".to_string()))?;

        let request = serde_json::json!({ "code": code }).to_string();
        process
            .stdin
            .write_all(format!("{}\n", request).as_bytes())
            .await
            .map_err(|e| SandboxError::SessionClosed(e.to_string()))?;
        process
            .stdin
            .flush()
            .await
            .map_err(|e| SandboxError::SessionClosed(e.to_string()))?;

        loop {
            match process.stdout.next_line().await? {
                Some(line) => match line.strip_prefix(RESULT_MARKER) {
                    Some(payload) => {
                        return serde_json::from_str(payload)
                            .map_err(|e| SandboxError::Protocol(e.to_string()))
                    }
                    None => debug!("[Sandbox] Ignoring stray output: {}", line),
                },
                None => {
                    return Err(SandboxError::SessionClosed(
                        "python interpreter exited".to_string(),
                    ))
                }
            }
        }
    }

    async fn collect_artifacts(&self, produced: Vec<String>) -> Vec<String> {
        let Some(dir) = &self.artifacts_dir else {
            return produced;
        };
        let dir = absolute(dir);
        let mut collected = Vec::with_capacity(produced.len());
        for path in produced {
            let source = PathBuf::from(&path);
            if source.starts_with(&dir) {
                collected.push(path);
                continue;
            }
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = dir.join(file_name);
            match tokio::fs::copy(&source, &target).await {
                Ok(_) => collected.push(target.to_string_lossy().into_owned()),
                Err(e) => warn!("[Sandbox] Failed to collect {}: {}", path, e),
            }
        }
        collected
    }
}

#[async_trait]
impl Sandbox for LocalPythonSandbox {
    async fn run(&mut self, code: &str) -> Result<ExecutionObservation, SandboxError> {
        if self.in_flight || self.process.is_none() {
            warn!("[Sandbox] Restarting Python session; interpreter state is lost");
            self.process = None;
            self.process = Some(self.spawn()?);
            self.in_flight = false;
        }

        self.in_flight = true;
        let reply = match self.exchange(code).await {
            Ok(reply) => reply,
            Err(e) => {
                self.in_flight = false;
                if matches!(e, SandboxError::SessionClosed(_)) {
                    self.process = None;
                }
                return Err(e);
            }
        };
        self.in_flight = false;

        let artifacts = self.collect_artifacts(reply.artifacts).await;
        Ok(ExecutionObservation {
            output: reply.output.map(|o| o.trim_end().to_string()),
            error: reply.error,
            artifacts,
        })
    }
}

impl Drop for LocalPythonSandbox {
    fn drop(&mut self) {
        self.process.take();
        if let Err(e) = std::fs::remove_dir_all(&self.session_dir) {
            debug!(
                "[Sandbox] Could not remove {}: {}",
                self.session_dir.display(),
                e
            );
        }
    }
}

/// Copy relative input files into the session directory at the same
/// relative path. Absolute paths are readable in place.
async fn stage_inputs(session_dir: &Path, inputs: &[PathBuf]) -> Result<(), SandboxError> {
    for input in inputs {
        if input.is_absolute() {
            continue;
        }
        let target = session_dir.join(input);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(input, &target).await?;
        debug!("[Sandbox] Staged {}", input.display());
    }
    Ok(())
}

async fn ensure_libraries(python: &str, libraries: &[String], install_missing: bool) {
    if libraries.is_empty() {
        return;
    }

    let probe = Command::new(python)
        .arg("-c")
        .arg(FIND_MISSING)
        .args(libraries)
        .output()
        .await;
    let missing: Vec<String> = match probe {
        Ok(output) if output.status.success() => String::from_utf8_lossy(&output.stdout)
            .trim()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Ok(output) => {
            warn!(
                "[Sandbox] Library probe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return;
        }
        Err(e) => {
            warn!("[Sandbox] Library probe failed: {}", e);
            return;
        }
    };

    if missing.is_empty() {
        return;
    }
    if !install_missing {
        warn!(
            "[Sandbox] Python libraries not importable: {}",
            missing.join(", ")
        );
        return;
    }

    info!("[Sandbox] Installing {}", missing.join(", "));
    match Command::new(python)
        .args(["-m", "pip", "install", "--quiet"])
        .args(&missing)
        .output()
        .await
    {
        Ok(output) if output.status.success() => {}
        Ok(output) => warn!(
            "[Sandbox] pip install failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => warn!("[Sandbox] pip install failed: {}", e),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
