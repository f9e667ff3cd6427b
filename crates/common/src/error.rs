//! The orchestrator's error taxonomy.
//!
//! A single flat enum is used across `orchestrator-core` and
//! `orchestrator-engine` rather than one error type per module: the
//! specification defines error *kinds*, not error *owners*, and several
//! kinds (e.g. `BackendUnavailable`) are raised from more than one call site.

use thiserror::Error;

/// The orchestrator's unified error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A task's `dependencies` entry names a task id absent from the DAG.
    #[error("task '{task_id}' references undefined dependencies: {missing:?}")]
    UnknownDependency { task_id: String, missing: Vec<String> },

    /// The dependency relation contains a cycle.
    #[error("DAG '{0}' contains a cycle")]
    Cycle(String),

    /// A task lists itself as a dependency.
    #[error("task '{0}' cannot depend on itself")]
    SelfDependency(String),

    /// A task defines neither `command` nor `callable`.
    #[error("task '{0}' must define either 'command' or 'callable'")]
    MissingBody(String),

    /// A numeric field that must be non-negative is negative.
    #[error("task '{task_id}' field '{field}' must be non-negative")]
    NegativeField { task_id: String, field: &'static str },

    /// A `callable` path is empty or has no module/attribute separator.
    #[error("invalid callable path: '{0}'")]
    InvalidCallablePath(String),

    /// A `callable` path did not resolve to a registered symbol.
    #[error("callable '{0}' not found")]
    SymbolNotFound(String),

    /// A resolved symbol is not invocable.
    #[error("'{0}' is not callable")]
    NotCallable(String),

    /// The persistence backend could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A payload or status record could not be (de)serialized.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A command or callable exceeded its configured timeout.
    #[error("execution timed out: {0}")]
    ExecutionTimeout(String),

    /// A shell command exited with a non-zero status.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// A callable raised or returned a failure.
    #[error("callable failed: {0}")]
    CallableFailed(String),

    /// Configuration could not be loaded or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for conditions with no dedicated kind.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a caller may reasonably retry the operation that produced
    /// this error. Validation-shaped errors (cycle, missing body, ...) are
    /// never retryable since retrying without changing the DAG definition
    /// produces the same failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::BackendUnavailable(_) | Error::ExecutionTimeout(_)
        )
    }

    /// Severity bucket, used to label the error-rate metric.
    #[must_use]
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Cycle(_) | Error::Config(_) | Error::BackendUnavailable(_) => {
                ErrorSeverity::Critical
            }
            Error::UnknownDependency { .. }
            | Error::SelfDependency(_)
            | Error::MissingBody(_)
            | Error::InvalidCallablePath(_)
            | Error::SymbolNotFound(_)
            | Error::NotCallable(_) => ErrorSeverity::High,
            Error::ExecutionTimeout(_) | Error::CommandFailed(_) | Error::CallableFailed(_) => {
                ErrorSeverity::Medium
            }
            Error::NegativeField { .. } => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }

    /// The error kind name as specified in the spec's error taxonomy, used
    /// as a metric label and in CLI diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::UnknownDependency { .. } => "UnknownDependency",
            Error::Cycle(_) => "Cycle",
            Error::SelfDependency(_) => "SelfDependency",
            Error::MissingBody(_) => "MissingBody",
            Error::NegativeField { .. } => "NegativeField",
            Error::InvalidCallablePath(_) => "InvalidCallablePath",
            Error::SymbolNotFound(_) => "SymbolNotFound",
            Error::NotCallable(_) => "NotCallable",
            Error::BackendUnavailable(_) => "BackendUnavailable",
            Error::SerializationError(_) => "SerializationError",
            Error::ExecutionTimeout(_) => "ExecutionTimeout",
            Error::CommandFailed(_) => "CommandFailed",
            Error::CallableFailed(_) => "CallableFailed",
            Error::Config(_) => "Config",
            Error::Io(_) => "Io",
            Error::Internal(_) => "Internal",
        }
    }
}

/// Error severity levels, used for the error-rate metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}
