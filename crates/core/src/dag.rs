//! DAG model and validation.
//!
//! Ported from the teacher's petgraph-based `DagExecutorImpl` in idiom
//! (separate graph-building and validation steps, `#[instrument]`-friendly
//! free functions) but the traversal itself is a hand-rolled Kahn pass: the
//! specification requires a *deterministic* tie-break (ties broken by
//! insertion order of `tasks`), which petgraph's `Topo` iterator does not
//! guarantee.

use indexmap::IndexMap;
use orchestrator_common::{Error, Metadata, Result, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::instrument;

/// Definition of a single DAG task.
///
/// `deny_unknown_fields` rejects DAG documents with typo'd or stale field
/// names outright rather than silently ignoring them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub callable: Option<String>,
    #[serde(default)]
    pub retries: i64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: i64,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub timeout_seconds: Option<i64>,
    #[serde(default)]
    pub metadata: Metadata,
}

fn default_retry_delay() -> i64 {
    5
}

/// Directed acyclic graph of tasks.
///
/// `tasks` is an `IndexMap` rather than a `HashMap` so the "tie-break by
/// insertion order" rule in `topological_order` has something concrete to
/// mean.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dag {
    pub id: String,
    pub name: String,
    pub tasks: IndexMap<TaskId, Task>,
}

impl Dag {
    /// Validate dependency references, body presence, non-negative
    /// numeric fields, self-dependencies, and acyclicity, in that order.
    #[instrument(skip(self), fields(dag_id = %self.id))]
    pub fn validate(&self) -> Result<()> {
        for task in self.tasks.values() {
            if task.command.is_none() && task.callable.is_none() {
                return Err(Error::MissingBody(task.id.clone()));
            }
        }

        for task in self.tasks.values() {
            if task.dependencies.iter().any(|dep| dep == &task.id) {
                return Err(Error::SelfDependency(task.id.clone()));
            }
        }

        for task in self.tasks.values() {
            let missing: Vec<TaskId> = task
                .dependencies
                .iter()
                .filter(|dep| !self.tasks.contains_key(*dep))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(Error::UnknownDependency {
                    task_id: task.id.clone(),
                    missing,
                });
            }
        }

        if self.has_cycle() {
            return Err(Error::Cycle(self.id.clone()));
        }

        for task in self.tasks.values() {
            if task.retries < 0 {
                return Err(Error::NegativeField {
                    task_id: task.id.clone(),
                    field: "retries",
                });
            }
            if task.retry_delay_seconds < 0 {
                return Err(Error::NegativeField {
                    task_id: task.id.clone(),
                    field: "retry_delay_seconds",
                });
            }
            if let Some(timeout) = task.timeout_seconds {
                if timeout <= 0 {
                    return Err(Error::NegativeField {
                        task_id: task.id.clone(),
                        field: "timeout_seconds",
                    });
                }
            }
        }

        Ok(())
    }

    /// Counting Kahn pass used purely to detect cycles, run before
    /// `topological_order` is ever invoked.
    fn has_cycle(&self) -> bool {
        let mut indegree = self.indegree_map();
        let mut queue: VecDeque<&TaskId> = self
            .tasks
            .keys()
            .filter(|id| indegree[*id] == 0)
            .collect();
        let mut visited = 0usize;

        while let Some(current) = queue.pop_front() {
            visited += 1;
            for task in self.tasks.values() {
                if task.dependencies.iter().any(|dep| dep == current) {
                    let entry = indegree.get_mut(&task.id).unwrap();
                    *entry -= 1;
                    if *entry == 0 {
                        queue.push_back(&task.id);
                    }
                }
            }
        }

        visited != self.tasks.len()
    }

    fn indegree_map(&self) -> IndexMap<TaskId, usize> {
        let mut indegree: IndexMap<TaskId, usize> =
            self.tasks.keys().map(|id| (id.clone(), 0)).collect();
        for task in self.tasks.values() {
            for _dep in &task.dependencies {
                *indegree.get_mut(&task.id).unwrap() += 1;
            }
        }
        indegree
    }

    /// Deterministic topological order via Kahn's algorithm: among
    /// equally-ready nodes, pop in the insertion order of `tasks`.
    #[instrument(skip(self), fields(dag_id = %self.id))]
    pub fn topological_order(&self) -> Result<Vec<TaskId>> {
        let mut indegree = self.indegree_map();
        let mut adjacency: IndexMap<TaskId, Vec<TaskId>> =
            self.tasks.keys().map(|id| (id.clone(), Vec::new())).collect();
        for task in self.tasks.values() {
            for dep in &task.dependencies {
                adjacency.get_mut(dep).unwrap().push(task.id.clone());
            }
        }

        let mut queue: VecDeque<TaskId> = self
            .tasks
            .keys()
            .filter(|id| indegree[*id] == 0)
            .cloned()
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(node) = queue.pop_front() {
            order.push(node.clone());
            for neighbor in &adjacency[&node] {
                let entry = indegree.get_mut(neighbor).unwrap();
                *entry -= 1;
                if *entry == 0 {
                    queue.push_back(neighbor.clone());
                }
            }
        }

        if order.len() != self.tasks.len() {
            return Err(Error::Cycle(self.id.clone()));
        }

        Ok(order)
    }

    /// Inverse adjacency: task id -> ids of tasks that directly depend on it.
    pub(crate) fn downstream_map(&self) -> IndexMap<TaskId, Vec<TaskId>> {
        let mut downstream: IndexMap<TaskId, Vec<TaskId>> =
            self.tasks.keys().map(|id| (id.clone(), Vec::new())).collect();
        for task in self.tasks.values() {
            for dep in &task.dependencies {
                downstream.get_mut(dep).unwrap().push(task.id.clone());
            }
        }
        downstream
    }

    /// Tasks with no dependencies: the roots a fresh run seeds onto the queue.
    pub fn runnable_roots(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| task.dependencies.is_empty())
            .collect()
    }
}

/// Unreachable-node check retained for completeness/debugging; not part of
/// `validate` (the spec does not require rejecting disconnected
/// components, only cycles and unknown references).
pub fn unreachable_tasks(dag: &Dag) -> Vec<TaskId> {
    let mut visited: HashSet<&TaskId> = HashSet::new();
    let mut stack: Vec<&TaskId> = dag
        .tasks
        .values()
        .filter(|t| t.dependencies.is_empty())
        .map(|t| &t.id)
        .collect();

    let downstream = dag.downstream_map();
    while let Some(id) = stack.pop() {
        if visited.insert(id) {
            for child in &downstream[id] {
                stack.push(child);
            }
        }
    }

    dag.tasks
        .keys()
        .filter(|id| !visited.contains(*id))
        .cloned()
        .collect()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Build a DAG of `n` tasks where task `i` may only depend on tasks
    /// inserted before it (indices `0..i`), so every generated DAG is
    /// acyclic by construction. `deps_mask` picks, for each task, which of
    /// its eligible predecessors become dependencies.
    fn acyclic_dag(ids: Vec<String>, deps_masks: Vec<Vec<bool>>) -> Dag {
        let mut tasks = IndexMap::new();
        for (i, id) in ids.iter().enumerate() {
            let mask = &deps_masks[i];
            let dependencies: Vec<TaskId> = ids[..i]
                .iter()
                .enumerate()
                .filter(|(j, _)| mask.get(*j).copied().unwrap_or(false))
                .map(|(_, dep)| dep.clone())
                .collect();
            tasks.insert(
                id.clone(),
                Task {
                    id: id.clone(),
                    name: id.clone(),
                    command: Some("echo hi".to_string()),
                    callable: None,
                    retries: 0,
                    retry_delay_seconds: 0,
                    dependencies,
                    timeout_seconds: None,
                    metadata: Metadata::default(),
                },
            );
        }
        Dag {
            id: "prop".to_string(),
            name: "prop".to_string(),
            tasks,
        }
    }

    /// Distinct task ids and, for each, a same-length bitmask over its
    /// eligible predecessors.
    fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Dag> {
        (2..=max_tasks).prop_flat_map(|n| {
            let ids: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
            let masks = ids
                .iter()
                .enumerate()
                .map(|(i, _)| prop::collection::vec(any::<bool>(), i))
                .collect::<Vec<_>>();
            (Just(ids), masks).prop_map(|(ids, deps_masks)| acyclic_dag(ids, deps_masks))
        })
    }

    proptest! {
        /// Property 1 (acyclicity): every DAG built with dependencies
        /// restricted to earlier-inserted tasks validates successfully and
        /// yields a topological order that is a permutation of its tasks
        /// respecting every dependency edge.
        #[test]
        fn acyclic_dags_validate_and_order_respects_dependencies(dag in dag_strategy(12)) {
            dag.validate().expect("acyclic-by-construction DAG must validate");
            let order = dag.topological_order().expect("must produce an order");

            let mut seen: HashSet<&TaskId> = HashSet::new();
            prop_assert_eq!(order.len(), dag.tasks.len());
            for id in &order {
                prop_assert!(dag.tasks.contains_key(id));
                seen.insert(id);
            }
            prop_assert_eq!(seen.len(), dag.tasks.len());

            let position: std::collections::HashMap<&TaskId, usize> =
                order.iter().enumerate().map(|(i, id)| (id, i)).collect();
            for task in dag.tasks.values() {
                for dep in &task.dependencies {
                    prop_assert!(position[dep] < position[&task.id]);
                }
            }
        }

        /// Property 7 (tie-break determinism): `topological_order` is a
        /// pure function of the DAG's own insertion order — repeated calls
        /// against the same DAG value return identical orders.
        #[test]
        fn topological_order_is_deterministic(dag in dag_strategy(12)) {
            let first = dag.topological_order().unwrap();
            let second = dag.topological_order().unwrap();
            prop_assert_eq!(first, second);
        }

        /// Property 1 (acyclicity), rejection side: forcing the
        /// first-inserted and last-inserted tasks to depend on each other
        /// closes a 2-node cycle regardless of the rest of the DAG, which
        /// `validate` must reject.
        #[test]
        fn closing_a_back_edge_is_rejected_as_a_cycle(mut dag in dag_strategy(12)) {
            let first_id = dag.tasks.keys().next().unwrap().clone();
            let last_id = dag.tasks.keys().last().unwrap().clone();
            prop_assume!(first_id != last_id);

            dag.tasks.get_mut(&last_id).unwrap().dependencies.push(first_id.clone());
            dag.tasks.get_mut(&first_id).unwrap().dependencies.push(last_id);

            prop_assert!(matches!(dag.validate(), Err(Error::Cycle(_))));
        }
    }
}
