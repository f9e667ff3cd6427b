//! Task execution: runs a single task-run payload's `command` or
//! `callable` and reports back a structured result.
//!
//! Ported in behavior from `original_source/orchestrator/executor.py`'s
//! `execute_task`. Two differences follow from the platform:
//!
//! - `subprocess.run(..., timeout=...)` becomes `tokio::process::Command`
//!   wrapped in `tokio::time::timeout`, killing the child on expiry.
//! - Python dynamically imports `callable_path` and runs it in a
//!   `multiprocessing.Process` for isolation. Rust has no equivalent
//!   dynamic symbol lookup, so callables are looked up in a process-local
//!   [`CallableRegistry`] registered at startup, and isolation is
//!   approximated with a dedicated OS thread joined with a deadline
//!   (`std::sync::mpsc::RecvTimeoutError` standing in for `Process::join`).

use once_cell::sync::Lazy;
use orchestrator_common::{Error, Metadata, Result};
use orchestrator_core::util::human_readable_duration;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{instrument, warn};

/// A process-local callable, addressed by the same dotted path a DAG
/// document's `callable` field names (e.g. `"myapp.jobs.cleanup"`).
pub type Callable = Arc<dyn Fn(&Metadata) -> anyhow::Result<Value> + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<String, Callable>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Registry of callables a worker process can execute by name.
///
/// Rust has no runtime module/symbol lookup, so a task's `callable` path
/// must be registered here (typically at process startup, before the
/// worker loop begins) rather than resolved dynamically as the Python
/// reference implementation's `safe_import` does.
pub struct CallableRegistry;

impl CallableRegistry {
    /// Register `path` to invoke `func` whenever a task names it.
    pub fn register(path: impl Into<String>, func: Callable) {
        REGISTRY.write().insert(path.into(), func);
    }

    fn lookup(path: &str) -> Option<Callable> {
        REGISTRY.read().get(path).cloned()
    }
}

/// Validate a `callable` reference's syntax: `module.path:attribute`
/// (preferred) or `module.path.attribute` (accepted). Empty paths and
/// paths with no module/attribute separator are rejected before lookup,
/// per spec's `InvalidCallablePath` kind.
fn validate_callable_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::InvalidCallablePath(path.to_string()));
    }
    let has_separator = path.contains(':') || path.contains('.');
    if !has_separator {
        return Err(Error::InvalidCallablePath(path.to_string()));
    }
    Ok(())
}

/// Outcome of executing one task-run payload.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
    pub duration: String,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    Success,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

/// Execute either `command` (a shell command) or `callable` (a registered
/// process-local function), honoring `timeout_seconds` if set. Exactly one
/// of `command`/`callable` must be present; neither is a caller error the
/// scheduler should have already rejected via `Dag::validate`.
#[instrument(skip(command, callable, metadata), fields(timeout_seconds))]
pub async fn execute(
    command: Option<&str>,
    callable: Option<&str>,
    metadata: &Metadata,
    timeout_seconds: Option<u64>,
) -> Result<ExecutionResult> {
    let started = Instant::now();

    if let Some(command) = command {
        return Ok(execute_command(command, timeout_seconds, started).await);
    }

    if let Some(callable) = callable {
        validate_callable_path(callable)?;
        let func = CallableRegistry::lookup(callable).ok_or_else(|| Error::SymbolNotFound(callable.to_string()))?;
        return Ok(execute_callable(func, metadata, timeout_seconds, started));
    }

    Err(Error::MissingBody(
        "task payload has neither command nor callable".to_string(),
    ))
}

async fn execute_command(command: &str, timeout_seconds: Option<u64>, started: Instant) -> ExecutionResult {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(err) => {
            return ExecutionResult {
                status: ExecutionStatus::Failed,
                stdout: String::new(),
                stderr: err.to_string(),
                duration: human_readable_duration(started.elapsed()),
                exit_code: None,
            }
        }
    };

    let wait = child.wait_with_output();
    let outcome = match timeout_seconds {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait).await,
        None => Ok(wait.await),
    };

    match outcome {
        Ok(Ok(output)) => ExecutionResult {
            status: if output.status.success() {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failed
            },
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration: human_readable_duration(started.elapsed()),
            exit_code: output.status.code(),
        },
        Ok(Err(err)) => ExecutionResult {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: err.to_string(),
            duration: human_readable_duration(started.elapsed()),
            exit_code: None,
        },
        Err(_elapsed) => ExecutionResult {
            status: ExecutionStatus::Timeout,
            stdout: String::new(),
            stderr: "command execution exceeded timeout".to_string(),
            duration: human_readable_duration(started.elapsed()),
            exit_code: None,
        },
    }
}

fn execute_callable(
    func: Callable,
    metadata: &Metadata,
    timeout_seconds: Option<u64>,
    started: Instant,
) -> ExecutionResult {
    let (tx, rx) = std_mpsc::channel();
    let metadata = metadata.clone();
    std::thread::spawn(move || {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| func(&metadata)));
        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_panic) => Err("callable panicked".to_string()),
        };
        let _ = tx.send(result);
    });

    let received = match timeout_seconds {
        Some(secs) => rx.recv_timeout(Duration::from_secs(secs)),
        None => rx.recv().map_err(|_| std_mpsc::RecvTimeoutError::Disconnected),
    };

    match received {
        Ok(Ok(value)) => ExecutionResult {
            status: ExecutionStatus::Success,
            stdout: serde_json::to_string(&value).unwrap_or_default(),
            stderr: String::new(),
            duration: human_readable_duration(started.elapsed()),
            exit_code: Some(0),
        },
        Ok(Err(message)) => ExecutionResult {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: message,
            duration: human_readable_duration(started.elapsed()),
            exit_code: Some(1),
        },
        Err(std_mpsc::RecvTimeoutError::Timeout) => {
            warn!("callable execution exceeded timeout");
            ExecutionResult {
                status: ExecutionStatus::Timeout,
                stdout: String::new(),
                stderr: "callable execution exceeded timeout".to_string(),
                duration: human_readable_duration(started.elapsed()),
                exit_code: None,
            }
        }
        Err(std_mpsc::RecvTimeoutError::Disconnected) => ExecutionResult {
            status: ExecutionStatus::Failed,
            stdout: String::new(),
            stderr: "callable produced no output".to_string(),
            duration: human_readable_duration(started.elapsed()),
            exit_code: Some(1),
        },
    }
}
