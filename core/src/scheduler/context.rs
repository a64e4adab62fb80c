//! Read-only views of application state the scheduler consults.
//!
//! The scheduler never owns the DAG object model or the container registry;
//! it sees them only through these narrow capability traits so that each can
//! be replaced by a fake in tests.

use stagecoach_common::{Container, ContainerId, TaskAttemptId, TaskId, VertexId};
use std::sync::Arc;

/// A vertex as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexInfo {
    pub id: VertexId,
    pub total_tasks: u32,
}

/// Lookups into the current DAG's vertex/task/attempt graph.
pub trait DagView: Send + Sync {
    /// Find a vertex by its user-visible name.
    fn vertex_by_name(&self, name: &str) -> Option<VertexInfo>;

    /// Find the task at `index` within a vertex.
    fn task(&self, vertex: &VertexId, index: u32) -> Option<TaskId>;

    /// The attempt that completed the task successfully, if any.
    fn successful_attempt(&self, task: &TaskId) -> Option<TaskAttemptId>;

    /// The container an attempt was assigned to, if any.
    fn assigned_container(&self, attempt: &TaskAttemptId) -> Option<ContainerId>;
}

/// Process-wide registry of containers known to the application.
pub trait ContainerRegistry: Send + Sync {
    fn get(&self, id: &ContainerId) -> Option<Container>;

    /// Register a container; returns `false` if it was already known.
    fn add_if_new(&self, container: Container) -> bool;
}

/// Application state handed to the scheduler event processor.
pub trait AppContext: Send + Sync {
    /// The DAG currently running, if one has been submitted.
    fn current_dag(&self) -> Option<Arc<dyn DagView>>;

    fn containers(&self) -> Arc<dyn ContainerRegistry>;
}

/// An [`AppContext`] over a fixed registry and a swappable current DAG.
pub struct SimpleAppContext {
    dag: std::sync::RwLock<Option<Arc<dyn DagView>>>,
    containers: Arc<dyn ContainerRegistry>,
}

impl SimpleAppContext {
    pub fn new(containers: Arc<dyn ContainerRegistry>) -> Self {
        Self {
            dag: std::sync::RwLock::new(None),
            containers,
        }
    }

    /// Make `dag` the current DAG.
    pub fn set_current_dag(&self, dag: Arc<dyn DagView>) {
        let mut current = self
            .dag
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = Some(dag);
    }

    pub fn clear_current_dag(&self) {
        let mut current = self
            .dag
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *current = None;
    }
}

impl AppContext for SimpleAppContext {
    fn current_dag(&self) -> Option<Arc<dyn DagView>> {
        self.dag
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn containers(&self) -> Arc<dyn ContainerRegistry> {
        Arc::clone(&self.containers)
    }
}
