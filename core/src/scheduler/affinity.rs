//! Affinity resolution
//!
//! Turns a task location hint ("run near source task N of vertex V") into the
//! container that ran that task's successful attempt. Every missing link
//! degrades to "no affinity": an unaffinitized placement is always valid,
//! just potentially less efficient.

use stagecoach_common::{ContainerId, TaskLocationHint};
use tracing::debug;

use crate::scheduler::context::DagView;

/// Resolve `hint` against `dag`.
///
/// Returns `None` when the vertex is unknown, the task index is out of range,
/// the task has no successful attempt yet, or that attempt was never assigned
/// a container.
pub fn resolve_affinity(dag: &dyn DagView, hint: &TaskLocationHint) -> Option<ContainerId> {
    let Some(vertex) = dag.vertex_by_name(&hint.vertex_name) else {
        debug!(vertex = %hint.vertex_name, "affinity vertex not found");
        return None;
    };

    if hint.task_index >= vertex.total_tasks {
        debug!(
            vertex = %hint.vertex_name,
            task_index = hint.task_index,
            total_tasks = vertex.total_tasks,
            "affinity task index out of range"
        );
        return None;
    }

    let Some(task) = dag.task(&vertex.id, hint.task_index) else {
        debug!(vertex = %vertex.id, task_index = hint.task_index, "affinity task not found");
        return None;
    };

    let Some(attempt) = dag.successful_attempt(&task) else {
        debug!(task = %task, "affinity task has no successful attempt");
        return None;
    };

    let container = dag.assigned_container(&attempt);
    match &container {
        Some(container_id) => {
            debug!(attempt = %attempt, container = %container_id, "resolved affinity")
        }
        None => debug!(attempt = %attempt, "successful attempt has no assigned container"),
    }
    container
}
