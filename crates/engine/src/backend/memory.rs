//! In-memory `Persistence` implementation.
//!
//! Ported in behavior from `original_source/orchestrator/persistence.py`'s
//! `InMemoryPersistence`: a `Mutex`-guarded map for DAGs and statuses, and a
//! FIFO queue. The async idiom differs (a `tokio::sync::mpsc` channel takes
//! the place of `queue.Queue`'s blocking `get(timeout=...)`).

use async_trait::async_trait;
use orchestrator_common::{Result, StatusRecord};
use orchestrator_core::{persistence::Persistence, plan::TaskRunPayload};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

/// Thread-safe in-memory persistence for tests and single-process runs.
pub struct InMemoryBackend {
    dags: Mutex<HashMap<String, String>>,
    statuses: Mutex<HashMap<String, StatusRecord>>,
    queue_tx: mpsc::UnboundedSender<TaskRunPayload>,
    queue_rx: Mutex<mpsc::UnboundedReceiver<TaskRunPayload>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            dags: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            queue_tx,
            queue_rx: Mutex::new(queue_rx),
        }
    }
}

fn merge_record(status: &str, meta: Value) -> StatusRecord {
    let mut record = StatusRecord {
        status: Some(status.to_string()),
        meta: HashMap::new(),
    };
    if let Value::Object(map) = meta {
        record.meta.extend(map);
    }
    record
}

#[async_trait]
impl Persistence for InMemoryBackend {
    async fn save_dag(&self, dag_id: &str, blob: &str) -> Result<()> {
        self.dags.lock().await.insert(dag_id.to_string(), blob.to_string());
        Ok(())
    }

    async fn load_dag(&self, dag_id: &str) -> Result<Option<String>> {
        Ok(self.dags.lock().await.get(dag_id).cloned())
    }

    async fn list_dags(&self) -> Result<Vec<String>> {
        Ok(self.dags.lock().await.keys().cloned().collect())
    }

    async fn push_task(&self, payload: &TaskRunPayload) -> Result<()> {
        self.queue_tx
            .send(payload.clone())
            .map_err(|_| orchestrator_common::Error::BackendUnavailable(
                "in-memory queue receiver dropped".to_string(),
            ))
    }

    async fn pop_task(&self, timeout_seconds: u64) -> Result<Option<TaskRunPayload>> {
        let mut rx = self.queue_rx.lock().await;
        match tokio::time::timeout(Duration::from_secs(timeout_seconds), rx.recv()).await {
            Ok(Some(payload)) => Ok(Some(payload)),
            Ok(None) => Ok(None),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn save_status(&self, key: &str, status: &str, meta: Value) -> Result<()> {
        self.statuses
            .lock()
            .await
            .insert(key.to_string(), merge_record(status, meta));
        Ok(())
    }

    async fn get_status(&self, key: &str) -> Result<StatusRecord> {
        Ok(self.statuses.lock().await.get(key).cloned().unwrap_or_default())
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        Ok(self
            .statuses
            .lock()
            .await
            .keys()
            .filter_map(|key| key.strip_prefix("run:"))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_common::Status;
    use serde_json::json;

    #[tokio::test]
    async fn push_then_pop_returns_same_payload() {
        let backend = InMemoryBackend::new();
        let payload = TaskRunPayload {
            task_run_id: "r1:t1:0".to_string(),
            run_id: "r1".to_string(),
            task_id: "t1".to_string(),
            dag_id: "d1".to_string(),
            command: Some("echo hi".to_string()),
            callable: None,
            attempt: 0,
            retries: 0,
            retry_delay_seconds: 2,
            dependencies: vec![],
            downstream: vec![],
            timeout_seconds: None,
            metadata: HashMap::new(),
            dag_blueprint: None,
        };
        backend.push_task(&payload).await.unwrap();
        let popped = backend.pop_task(1).await.unwrap();
        assert_eq!(popped.unwrap().task_run_id, "r1:t1:0");
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let backend = InMemoryBackend::new();
        let popped = backend.pop_task(1).await.unwrap();
        assert!(popped.is_none());
    }

    #[tokio::test]
    async fn save_and_get_status_round_trips() {
        let backend = InMemoryBackend::new();
        backend
            .save_status("r1:t1", "success", json!({"exit_code": 0}))
            .await
            .unwrap();
        let record = backend.get_status("r1:t1").await.unwrap();
        assert!(record.is_status(Status::Success));
        assert_eq!(record.meta.get("exit_code"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn list_runs_strips_prefix() {
        let backend = InMemoryBackend::new();
        backend
            .save_status("run:r1", "scheduled", json!({}))
            .await
            .unwrap();
        backend.save_status("r1:t1", "queued", json!({})).await.unwrap();
        assert_eq!(backend.list_runs().await.unwrap(), vec!["r1".to_string()]);
    }
}
