//! Domain-agnostic types shared across the orchestrator workspace.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a task within a DAG (unique among its siblings).
pub type TaskId = String;

/// Caller-supplied opaque identifier of a single DAG execution.
pub type RunId = String;

/// Free-form mapping passed to callables and carried on the wire verbatim.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Status of a single task attempt or canonical task-in-run status.
///
/// `pending` from the specification is deliberately absent: it is never
/// written, it is the state implied by the *absence* of a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Running,
    Success,
    Failed,
    Timeout,
    Cancelled,
}

impl Status {
    /// Terminal statuses never transition further for a given attempt.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Success | Status::Failed | Status::Timeout | Status::Cancelled
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Queued => "queued",
            Status::Running => "running",
            Status::Success => "success",
            Status::Failed => "failed",
            Status::Timeout => "timeout",
            Status::Cancelled => "cancelled",
        }
    }
}

/// Status of an entire run, tracked at the `run:{run_id}` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Scheduled => "scheduled",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// A status record as returned by `Persistence::get_status`: the status
/// value plus whatever metadata was attached at the time of the write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: Option<String>,
    #[serde(flatten)]
    pub meta: HashMap<String, serde_json::Value>,
}

impl StatusRecord {
    /// Whether this record's status matches `status` exactly.
    #[must_use]
    pub fn is_status(&self, status: Status) -> bool {
        self.status.as_deref() == Some(status.as_str())
    }

    /// Whether the canonical status already covers this attempt: the
    /// idempotency guard used by `schedule_downstream` and the worker's
    /// early-exit check.
    #[must_use]
    pub fn is_already_scheduled(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some("queued") | Some("running") | Some("success")
        )
    }
}
