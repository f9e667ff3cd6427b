//! The persistence contract: the sole interface the scheduling/execution
//! core consumes. In-memory and remote implementations live in
//! `orchestrator-engine::backend`.

use crate::plan::TaskRunPayload;
use async_trait::async_trait;
use orchestrator_common::{Result, StatusRecord};
use serde_json::Value;

/// Pluggable persistence backend over a DAG store, task queue, and status
/// store. All operations must be safe for concurrent callers.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Persist a DAG document under its id, overwriting any prior value.
    async fn save_dag(&self, dag_id: &str, blob: &str) -> Result<()>;

    /// Load a previously saved DAG document, if any.
    async fn load_dag(&self, dag_id: &str) -> Result<Option<String>>;

    /// List the ids of every DAG ever saved. First-class so callers never
    /// need to reach into backend-private state (see Design Note 9(b)).
    async fn list_dags(&self) -> Result<Vec<String>>;

    /// Push a task-run payload onto the shared queue. Non-blocking.
    async fn push_task(&self, payload: &TaskRunPayload) -> Result<()>;

    /// Pop the next payload, blocking up to `timeout_seconds`. Returns
    /// `None` iff no item arrived within the timeout.
    async fn pop_task(&self, timeout_seconds: u64) -> Result<Option<TaskRunPayload>>;

    /// Overwrite the status record at `key` (a `task_run_id`, a canonical
    /// `{run_id}:{task_id}` key, or a `run:{run_id}` key).
    async fn save_status(&self, key: &str, status: &str, meta: Value) -> Result<()>;

    /// Fetch the status record at `key`; an absent record is returned as a
    /// default (empty) `StatusRecord`, matching `pending`'s "never written"
    /// semantics.
    async fn get_status(&self, key: &str) -> Result<StatusRecord>;

    /// List every `run_id` this backend has ever recorded a `run:{run_id}`
    /// status for. First-class per Design Note 9(b).
    async fn list_runs(&self) -> Result<Vec<String>>;
}
