//! In-memory DAG graph
//!
//! Upstream vertex and task logic records vertices, successful attempts and
//! container assignments here as they happen; the scheduler reads it through
//! [`DagView`].

use stagecoach_common::{ContainerId, DagId, TaskAttemptId, TaskId, VertexId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use crate::scheduler::context::{DagView, VertexInfo};

#[derive(Debug, Default)]
struct DagState {
    vertices_by_name: HashMap<String, VertexInfo>,
    vertices: HashMap<VertexId, VertexInfo>,
    successful_attempts: HashMap<TaskId, TaskAttemptId>,
    assigned_containers: HashMap<TaskAttemptId, ContainerId>,
}

/// A DAG whose graph lives entirely in memory.
#[derive(Debug)]
pub struct InMemoryDag {
    id: DagId,
    state: RwLock<DagState>,
}

impl InMemoryDag {
    pub fn new(id: DagId) -> Self {
        Self {
            id,
            state: RwLock::new(DagState::default()),
        }
    }

    pub fn id(&self) -> DagId {
        self.id
    }

    /// Add a vertex with `total_tasks` tasks, returning its id.
    ///
    /// Re-adding an existing name replaces its task count but keeps its id.
    pub fn add_vertex(&self, name: impl Into<String>, total_tasks: u32) -> VertexId {
        let name = name.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let id = match state.vertices_by_name.get(&name) {
            Some(existing) => existing.id,
            None => VertexId::new(self.id, state.vertices.len() as u32),
        };
        let info = VertexInfo { id, total_tasks };
        state.vertices_by_name.insert(name, info);
        state.vertices.insert(id, info);
        id
    }

    /// Record the attempt that completed its task.
    pub fn set_successful_attempt(&self, attempt: TaskAttemptId) {
        debug!(attempt = %attempt, "recording successful attempt");
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.successful_attempts.insert(attempt.task, attempt);
    }

    /// Record the container an attempt runs in.
    pub fn assign_container(&self, attempt: TaskAttemptId, container: ContainerId) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.assigned_containers.insert(attempt, container);
    }
}

impl DagView for InMemoryDag {
    fn vertex_by_name(&self, name: &str) -> Option<VertexInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.vertices_by_name.get(name).copied()
    }

    fn task(&self, vertex: &VertexId, index: u32) -> Option<TaskId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let info = state.vertices.get(vertex)?;
        (index < info.total_tasks).then(|| TaskId::new(*vertex, index))
    }

    fn successful_attempt(&self, task: &TaskId) -> Option<TaskAttemptId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.successful_attempts.get(task).copied()
    }

    fn assigned_container(&self, attempt: &TaskAttemptId) -> Option<ContainerId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.assigned_containers.get(attempt).cloned()
    }
}
