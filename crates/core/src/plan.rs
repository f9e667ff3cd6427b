//! Run planning: turning a validated DAG into per-task queue payloads.

use crate::dag::{Dag, Task};
use orchestrator_common::{Metadata, Result, RunId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The unit of work enqueued onto the task queue.
///
/// Carries `dag_blueprint`, a snapshot of every task's base payload in the
/// run, so a worker can construct downstream payloads without re-reading
/// the DAG store (see `orchestrator-engine::worker::schedule_downstream`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRunPayload {
    pub task_run_id: String,
    pub run_id: RunId,
    pub task_id: TaskId,
    pub dag_id: String,
    pub command: Option<String>,
    pub callable: Option<String>,
    pub attempt: u32,
    pub retries: i64,
    pub retry_delay_seconds: i64,
    pub dependencies: Vec<TaskId>,
    pub downstream: Vec<TaskId>,
    pub timeout_seconds: Option<i64>,
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag_blueprint: Option<HashMap<TaskId, TaskRunPayload>>,
}

impl TaskRunPayload {
    fn from_task(task: &Task, run_id: &RunId, dag_id: &str, downstream: Vec<TaskId>) -> Self {
        Self {
            task_run_id: task_run_id(run_id, &task.id, 0),
            run_id: run_id.clone(),
            task_id: task.id.clone(),
            dag_id: dag_id.to_string(),
            command: task.command.clone(),
            callable: task.callable.clone(),
            attempt: 0,
            retries: task.retries,
            retry_delay_seconds: task.retry_delay_seconds,
            dependencies: task.dependencies.clone(),
            downstream,
            timeout_seconds: task.timeout_seconds,
            metadata: task.metadata.clone(),
            dag_blueprint: None,
        }
    }
}

/// Format of the composite key identifying a single task attempt.
#[must_use]
pub fn task_run_id(run_id: &str, task_id: &str, attempt: u32) -> String {
    format!("{run_id}:{task_id}:{attempt}")
}

/// Format of the canonical (latest-attempt) status key for a task in a run.
#[must_use]
pub fn canonical_status_key(run_id: &str, task_id: &str) -> String {
    format!("{run_id}:{task_id}")
}

/// Validate the DAG and build one base payload per task, with `downstream`
/// set to the inverse adjacency. `dag_blueprint` is left unset here; the
/// scheduler attaches it to every payload after this call returns (it needs
/// the full list before it can build the blueprint map).
pub fn build_run_tasks(dag: &Dag, run_id: &RunId) -> Result<Vec<TaskRunPayload>> {
    dag.validate()?;
    let downstream = dag.downstream_map();

    Ok(dag
        .tasks
        .values()
        .map(|task| {
            let children = downstream.get(&task.id).cloned().unwrap_or_default();
            TaskRunPayload::from_task(task, run_id, &dag.id, children)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::Task;
    use indexmap::IndexMap;

    fn task(id: &str, deps: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            name: id.to_string(),
            command: Some("echo hi".to_string()),
            callable: None,
            retries: 2,
            retry_delay_seconds: 1,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            timeout_seconds: None,
            metadata: Metadata::default(),
        }
    }

    #[test]
    fn builds_payload_with_inverse_downstream() {
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[]));
        tasks.insert("b".to_string(), task("b", &["a"]));
        let dag = Dag {
            id: "demo".to_string(),
            name: "demo".to_string(),
            tasks,
        };

        let payloads = build_run_tasks(&dag, &"r1".to_string()).unwrap();
        let a = payloads.iter().find(|p| p.task_id == "a").unwrap();
        assert_eq!(a.task_run_id, "r1:a:0");
        assert_eq!(a.downstream, vec!["b".to_string()]);
        assert!(a.dag_blueprint.is_none());

        let b = payloads.iter().find(|p| p.task_id == "b").unwrap();
        assert_eq!(b.dependencies, vec!["a".to_string()]);
        assert!(b.downstream.is_empty());
    }

    #[test]
    fn round_trips_through_json_including_blueprint() {
        let mut tasks = IndexMap::new();
        tasks.insert("a".to_string(), task("a", &[]));
        let dag = Dag {
            id: "demo".to_string(),
            name: "demo".to_string(),
            tasks,
        };
        let mut payloads = build_run_tasks(&dag, &"r1".to_string()).unwrap();
        let blueprint: HashMap<TaskId, TaskRunPayload> = payloads
            .iter()
            .map(|p| (p.task_id.clone(), p.clone()))
            .collect();
        for p in &mut payloads {
            p.dag_blueprint = Some(blueprint.clone());
        }

        let json = serde_json::to_string(&payloads[0]).unwrap();
        let restored: TaskRunPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.task_run_id, payloads[0].task_run_id);
        assert_eq!(
            restored.dag_blueprint.unwrap().len(),
            payloads[0].dag_blueprint.as_ref().unwrap().len()
        );
    }
}
