//! The worker loop: pops payloads off the queue, executes them, retries on
//! failure, and fans out to dependency-satisfied downstream tasks on
//! success.
//!
//! Grounded in `original_source/orchestrator/worker.py`'s `Worker`: the same
//! `_process_task`/`_schedule_downstream`/`_build_child_payload`/
//! `_dependencies_satisfied`/`_already_scheduled`/`_mark_queued` split,
//! translated into `tokio::spawn`-driven async methods.

use crate::executor::{self, ExecutionStatus};
use orchestrator_common::{metrics, Result, RunStatus, Status};
use orchestrator_core::persistence::Persistence;
use orchestrator_core::plan::{canonical_status_key, task_run_id, TaskRunPayload};
use orchestrator_core::util::retry_backoff;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Polls `persistence` for runnable tasks and executes them until stopped.
pub struct Worker<P: Persistence> {
    persistence: Arc<P>,
    poll_timeout_seconds: u64,
}

impl<P: Persistence> Worker<P> {
    #[must_use]
    pub fn new(persistence: Arc<P>, poll_timeout_seconds: u64) -> Self {
        Self {
            persistence,
            poll_timeout_seconds,
        }
    }

    /// Run the poll loop. With `one_shot` set, returns as soon as the queue
    /// is empty instead of polling forever; used by the CLI's synchronous
    /// commands and by tests.
    pub async fn run(&self, one_shot: bool) -> Result<()> {
        info!(one_shot, "worker started");
        loop {
            let payload = match self.persistence.pop_task(self.poll_timeout_seconds).await {
                Ok(payload) => payload,
                Err(err) => {
                    error!(error = %err, "backend unavailable while polling for work");
                    self.backoff_and_continue().await;
                    continue;
                }
            };

            let Some(payload) = payload else {
                if one_shot {
                    return Ok(());
                }
                continue;
            };

            info!(task_run_id = %payload.task_run_id, "executing task");
            if let Err(err) = self.process_task(payload).await {
                error!(error = %err, "error processing task, resuming loop after backoff");
                self.backoff_and_continue().await;
            }
        }
    }

    /// Sleep a fixed backoff before resuming the poll loop after a backend
    /// error, per spec.md §7: a worker logs and continues after a backoff
    /// rather than terminating.
    async fn backoff_and_continue(&self) {
        tokio::time::sleep(retry_backoff(0)).await;
    }

    #[instrument(skip(self, payload), fields(task_run_id = %payload.task_run_id))]
    async fn process_task(&self, payload: TaskRunPayload) -> Result<()> {
        // Early-exit guard: a duplicate enqueue (e.g. two parents racing to
        // schedule the same child, or a requeued retry racing a stale pop of
        // an earlier attempt) can pop a task whose canonical status has
        // already moved past `queued`, or has moved on to a newer attempt
        // than this one. Treat both as a cheap no-op instead of re-running.
        let canonical_key = canonical_status_key(&payload.run_id, &payload.task_id);
        let canonical = self.persistence.get_status(&canonical_key).await?;
        if !matches!(canonical.status.as_deref(), None | Some("queued")) {
            debug!(task_run_id = %payload.task_run_id, "skipping stale duplicate pop");
            return Ok(());
        }
        if let Some(queued_for) = canonical.meta.get("task_run_id").and_then(Value::as_str) {
            if queued_for != payload.task_run_id {
                debug!(
                    task_run_id = %payload.task_run_id,
                    queued_for,
                    "skipping stale duplicate pop of a superseded attempt"
                );
                return Ok(());
            }
        }

        if self.run_cancelled(&payload.run_id).await? {
            info!(task_run_id = %payload.task_run_id, "run cancelled, skipping execution");
            self.record_status(&payload, Status::Cancelled.as_str(), json!({})).await?;
            return Ok(());
        }

        self.record_status(&payload, "running", json!({})).await?;

        let timeout_seconds = payload.timeout_seconds.map(|t| t.max(0) as u64);
        let started = std::time::Instant::now();
        let result = executor::execute(
            payload.command.as_deref(),
            payload.callable.as_deref(),
            &payload.metadata,
            timeout_seconds,
        )
        .await?;
        metrics::record_task_attempt(result.status.as_str(), started.elapsed().as_secs_f64());

        let result_meta = json!({
            "stdout": result.stdout,
            "stderr": result.stderr,
            "duration": result.duration,
            "exit_code": result.exit_code,
        });
        self.record_status(&payload, result.status.as_str(), result_meta).await?;

        if result.status == ExecutionStatus::Success {
            self.schedule_downstream(&payload).await?;
            return Ok(());
        }

        if payload.attempt < payload.retries as u32 {
            let next_attempt = payload.attempt + 1;
            let delay = retry_backoff(payload.attempt);
            warn!(
                next_attempt,
                retries = payload.retries,
                delay_secs = delay.as_secs_f64(),
                "retrying task"
            );
            tokio::time::sleep(delay).await;

            let mut retried = payload.clone();
            retried.attempt = next_attempt;
            retried.task_run_id = task_run_id(&retried.run_id, &retried.task_id, next_attempt);
            self.mark_queued(&retried).await?;
            self.persistence.push_task(&retried).await?;
        } else {
            error!(attempt = payload.attempt, "task failed after exhausting retries");
        }

        Ok(())
    }

    async fn schedule_downstream(&self, payload: &TaskRunPayload) -> Result<()> {
        if payload.downstream.is_empty() {
            return Ok(());
        }

        for child_id in &payload.downstream {
            let Some(child) = self.build_child_payload(payload, child_id) else {
                continue;
            };
            if !self.dependencies_satisfied(&child).await? {
                continue;
            }
            if self.already_scheduled(&child).await? {
                continue;
            }
            debug!(task_id = %child_id, "enqueueing downstream task");
            self.mark_queued(&child).await?;
            self.persistence.push_task(&child).await?;
        }

        Ok(())
    }

    fn build_child_payload(&self, parent: &TaskRunPayload, child_id: &str) -> Option<TaskRunPayload> {
        let blueprint = parent.dag_blueprint.as_ref()?;
        let base = blueprint.get(child_id)?;
        let mut child = base.clone();
        child.attempt = 0;
        child.task_run_id = task_run_id(&child.run_id, child_id, 0);
        child.dag_blueprint = parent.dag_blueprint.clone();
        Some(child)
    }

    async fn dependencies_satisfied(&self, child: &TaskRunPayload) -> Result<bool> {
        for dep in &child.dependencies {
            let key = canonical_status_key(&child.run_id, dep);
            let status = self.persistence.get_status(&key).await?;
            if !status.is_status(Status::Success) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Whether `run_id` has been marked cancelled at its `run:{run_id}`
    /// status key. Checked at the top of `process_task`, before a task
    /// transitions to `running`.
    async fn run_cancelled(&self, run_id: &str) -> Result<bool> {
        let status = self.persistence.get_status(&format!("run:{run_id}")).await?;
        Ok(status.status.as_deref() == Some(RunStatus::Cancelled.as_str()))
    }

    async fn already_scheduled(&self, child: &TaskRunPayload) -> Result<bool> {
        let key = canonical_status_key(&child.run_id, &child.task_id);
        let status = self.persistence.get_status(&key).await?;
        Ok(status.is_already_scheduled())
    }

    async fn record_status(&self, payload: &TaskRunPayload, status: &str, meta: Value) -> Result<()> {
        let enriched = enrich(meta, payload);
        self.persistence
            .save_status(&payload.task_run_id, status, enriched.clone())
            .await?;
        let canonical_key = canonical_status_key(&payload.run_id, &payload.task_id);
        self.persistence.save_status(&canonical_key, status, enriched).await
    }

    async fn mark_queued(&self, payload: &TaskRunPayload) -> Result<()> {
        let meta = json!({
            "task_id": payload.task_id,
            "run_id": payload.run_id,
            "task_run_id": payload.task_run_id,
        });
        let canonical_key = canonical_status_key(&payload.run_id, &payload.task_id);
        self.persistence
            .save_status(&payload.task_run_id, "queued", meta.clone())
            .await?;
        self.persistence.save_status(&canonical_key, "queued", meta).await
    }
}

fn enrich(meta: Value, payload: &TaskRunPayload) -> Value {
    let mut map = match meta {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("task_id".to_string(), json!(payload.task_id));
    map.insert("run_id".to_string(), json!(payload.run_id));
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::scheduler::Scheduler;
    use indexmap::IndexMap;
    use orchestrator_common::Metadata;
    use orchestrator_core::{Dag, Task};

    fn task(id: &str, deps: &[&str], command: &str) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            command: Some(command.to_string()),
            callable: None,
            retries: 0,
            retry_delay_seconds: 0,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            timeout_seconds: Some(5),
            metadata: Metadata::default(),
        }
    }

    #[tokio::test]
    async fn linear_run_completes_both_tasks() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = Scheduler::new(Arc::clone(&backend));
        let worker = Worker::new(Arc::clone(&backend), 1);

        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[], "echo a"));
        tasks.insert("b".to_string(), task("b", &["a"], "echo b"));
        let dag = Dag {
            id: "d1".to_string(),
            name: "linear".to_string(),
            tasks,
        };

        scheduler.schedule_dag(&dag, "run1").await.unwrap();
        worker.run(true).await.unwrap();

        let a = backend.get_status("run1:a").await.unwrap();
        assert!(a.is_status(Status::Success));
        let b = backend.get_status("run1:b").await.unwrap();
        assert!(b.is_status(Status::Success));
    }

    #[tokio::test]
    async fn failing_task_retries_then_gives_up() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut tasks = IndexMap::new();
        let mut t = task("a", &[], "exit 1");
        t.retries = 1;
        t.retry_delay_seconds = 0;
        tasks.insert("a".to_string(), t);
        let dag = Dag {
            id: "d1".to_string(),
            name: "retry".to_string(),
            tasks,
        };

        let scheduler = Scheduler::new(Arc::clone(&backend));
        scheduler.schedule_dag(&dag, "run1").await.unwrap();

        let worker = Worker::new(Arc::clone(&backend), 1);
        worker.process_task(backend.pop_task(1).await.unwrap().unwrap()).await.unwrap();
        let retried = backend.pop_task(1).await.unwrap().expect("requeued attempt");
        assert_eq!(retried.attempt, 1);
        worker.process_task(retried).await.unwrap();

        let status = backend.get_status("run1:a").await.unwrap();
        assert!(status.is_status(Status::Failed));
    }

    #[tokio::test]
    async fn diamond_fan_in_waits_for_both_parents() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[], "echo a"));
        tasks.insert("b".to_string(), task("b", &["a"], "echo b"));
        tasks.insert("c".to_string(), task("c", &["a"], "echo c"));
        tasks.insert("d".to_string(), task("d", &["b", "c"], "echo d"));
        let dag = Dag {
            id: "d1".to_string(),
            name: "diamond".to_string(),
            tasks,
        };

        let scheduler = Scheduler::new(Arc::clone(&backend));
        scheduler.schedule_dag(&dag, "run1").await.unwrap();
        let worker = Worker::new(Arc::clone(&backend), 1);
        worker.run(true).await.unwrap();

        let d = backend.get_status("run1:d").await.unwrap();
        assert!(d.is_status(Status::Success));
    }

    #[tokio::test]
    async fn cancelled_run_skips_execution() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[], "echo a"));
        let dag = Dag {
            id: "d1".to_string(),
            name: "cancel".to_string(),
            tasks,
        };

        let scheduler = Scheduler::new(Arc::clone(&backend));
        scheduler.schedule_dag(&dag, "run1").await.unwrap();
        backend
            .save_status("run:run1", orchestrator_common::RunStatus::Cancelled.as_str(), json!({}))
            .await
            .unwrap();

        let worker = Worker::new(Arc::clone(&backend), 1);
        let popped = backend.pop_task(1).await.unwrap().unwrap();
        worker.process_task(popped).await.unwrap();

        let status = backend.get_status("run1:a").await.unwrap();
        assert!(status.is_status(Status::Cancelled));
    }

    #[tokio::test]
    async fn stale_pop_of_superseded_attempt_is_skipped() {
        let backend = Arc::new(InMemoryBackend::new());
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[], "echo a"));
        let dag = Dag {
            id: "d1".to_string(),
            name: "stale".to_string(),
            tasks,
        };

        let scheduler = Scheduler::new(Arc::clone(&backend));
        scheduler.schedule_dag(&dag, "run1").await.unwrap();
        let worker = Worker::new(Arc::clone(&backend), 1);

        let attempt0 = backend.pop_task(1).await.unwrap().unwrap();

        // Simulate the canonical record moving on to a newer attempt (e.g. a
        // retry requeue) while a stale duplicate of attempt 0 is still in
        // flight.
        let mut attempt1 = attempt0.clone();
        attempt1.attempt = 1;
        attempt1.task_run_id = task_run_id(&attempt1.run_id, &attempt1.task_id, 1);
        worker.mark_queued(&attempt1).await.unwrap();

        worker.process_task(attempt0).await.unwrap();

        let canonical = backend.get_status("run1:a").await.unwrap();
        assert_eq!(canonical.status.as_deref(), Some("queued"));
        assert_eq!(
            canonical.meta.get("task_run_id").and_then(Value::as_str),
            Some(attempt1.task_run_id.as_str())
        );
    }
}
