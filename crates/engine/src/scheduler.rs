//! Run scheduling: validates a DAG, plans its tasks, and seeds the queue
//! with every dependency-free root.
//!
//! Grounded in `original_source/orchestrator/scheduler.py`'s `Scheduler`:
//! the same sequencing (validate, build payloads, build the blueprint,
//! attach it to every payload, persist the DAG document, persist run
//! metadata, then save a `queued` status and push each root) carried over
//! into the async idiom used by the rest of this crate.

use orchestrator_common::{Result, RunStatus};
use orchestrator_core::persistence::Persistence;
use orchestrator_core::plan::{build_run_tasks, canonical_status_key, task_run_id};
use orchestrator_core::Dag;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Seeds a DAG run's runnable roots onto a `Persistence` backend's queue.
pub struct Scheduler<P: Persistence> {
    persistence: Arc<P>,
}

impl<P: Persistence> Scheduler<P> {
    #[must_use]
    pub fn new(persistence: Arc<P>) -> Self {
        Self { persistence }
    }

    /// Validate `dag`, plan its tasks, persist the DAG and run metadata, and
    /// enqueue every dependency-free task at attempt 0.
    #[instrument(skip(self, dag), fields(dag_id = %dag.id, run_id = %run_id))]
    pub async fn schedule_dag(&self, dag: &Dag, run_id: &str) -> Result<()> {
        dag.validate()?;
        let tasks = build_run_tasks(dag, &run_id.to_string())?;

        let blueprint: HashMap<_, _> = tasks
            .iter()
            .map(|task| (task.task_id.clone(), task.clone()))
            .collect();

        let runnable: Vec<_> = tasks
            .into_iter()
            .map(|mut task| {
                task.dag_blueprint = Some(blueprint.clone());
                task
            })
            .filter(|task| task.dependencies.is_empty())
            .collect();

        info!(task_count = blueprint.len(), "scheduling DAG run");

        let dag_json = serde_json::to_string(dag)?;
        self.persistence.save_dag(&dag.id, &dag_json).await?;

        let run_metadata = build_run_metadata(dag, run_id, blueprint.len());
        self.persistence
            .save_status(
                &format!("run:{run_id}"),
                RunStatus::Scheduled.as_str(),
                run_metadata,
            )
            .await?;

        for task in runnable {
            debug!(task_id = %task.task_id, "enqueueing initial task");
            let meta = json!({
                "task_id": task.task_id,
                "run_id": run_id,
                "task_run_id": task_run_id(run_id, &task.task_id, 0),
            });
            let canonical_key = canonical_status_key(run_id, &task.task_id);
            self.persistence
                .save_status(&task.task_run_id, "queued", meta.clone())
                .await?;
            self.persistence
                .save_status(&canonical_key, "queued", meta)
                .await?;
            self.persistence.push_task(&task).await?;
        }

        Ok(())
    }
}

fn build_run_metadata(dag: &Dag, run_id: &str, task_count: usize) -> serde_json::Value {
    let task_ids: Vec<&str> = dag.tasks.keys().map(String::as_str).collect();
    json!({
        "dag_id": dag.id,
        "run_id": run_id,
        "task_count": task_count,
        "task_ids": task_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use orchestrator_common::Metadata;
    use orchestrator_core::Task;
    use indexmap::IndexMap;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            command: Some(format!("echo {id}")),
            callable: None,
            retries: 0,
            retry_delay_seconds: 2,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            timeout_seconds: None,
            metadata: Metadata::default(),
        }
    }

    fn linear_dag() -> Dag {
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[]));
        tasks.insert("b".to_string(), task("b", &["a"]));
        Dag {
            id: "d1".to_string(),
            name: "linear".to_string(),
            tasks,
        }
    }

    #[tokio::test]
    async fn schedules_only_dependency_free_roots() {
        let backend = Arc::new(InMemoryBackend::new());
        let scheduler = Scheduler::new(Arc::clone(&backend));
        let dag = linear_dag();

        scheduler.schedule_dag(&dag, "run1").await.unwrap();

        let popped = backend.pop_task(1).await.unwrap().expect("task a queued");
        assert_eq!(popped.task_id, "a");
        assert!(backend.pop_task(1).await.unwrap().is_none());

        let status = backend.get_status("run1:a").await.unwrap();
        assert!(status.is_already_scheduled());
        let run_status = backend.get_status("run:run1").await.unwrap();
        assert_eq!(run_status.status.as_deref(), Some("scheduled"));
    }
}
