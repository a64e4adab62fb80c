//! Identifiers for the objects the scheduler reasons about.
//!
//! Identifiers are small value types that nest: a task attempt knows its
//! task, a task knows its vertex, and a vertex knows its DAG. Their
//! `Display` forms are stable and are what appears in logs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a DAG within the running application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DagId(pub u32);

impl fmt::Display for DagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dag_{}", self.0)
    }
}

/// Identifier of a vertex within a DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VertexId {
    pub dag: DagId,
    pub index: u32,
}

impl VertexId {
    pub fn new(dag: DagId, index: u32) -> Self {
        Self { dag, index }
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vertex_{}_{:02}", self.dag.0, self.index)
    }
}

/// Identifier of a task: one partition of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    pub vertex: VertexId,
    pub index: u32,
}

impl TaskId {
    pub fn new(vertex: VertexId, index: u32) -> Self {
        Self { vertex, index }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "task_{}_{:02}_{:06}",
            self.vertex.dag.0, self.vertex.index, self.index
        )
    }
}

/// Identifier of one execution instance of a task.
///
/// A task may run several attempts (retries, speculative duplicates); each
/// gets a distinct attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskAttemptId {
    pub task: TaskId,
    pub attempt: u32,
}

impl TaskAttemptId {
    pub fn new(task: TaskId, attempt: u32) -> Self {
        Self { task, attempt }
    }
}

impl fmt::Display for TaskAttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempt_{}_{:02}_{:06}_{}",
            self.task.vertex.dag.0, self.task.vertex.index, self.task.index, self.attempt
        )
    }
}

/// Identifier of a container granted by the resource-allocation backend.
///
/// Opaque to the scheduler; the backend decides its format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContainerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identity of one shuffle input: which source task attempt produced the
/// bytes and which task consumes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputAttemptIdentifier {
    /// Index of the producing task within its vertex.
    pub src_task_index: u32,
    /// Attempt number of the producing task.
    pub attempt_number: u32,
    /// The task that fetches and reads this input.
    pub consumer: TaskId,
}

impl InputAttemptIdentifier {
    pub fn new(src_task_index: u32, attempt_number: u32, consumer: TaskId) -> Self {
        Self {
            src_task_index,
            attempt_number,
            consumer,
        }
    }
}

impl fmt::Display for InputAttemptIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input[src={}, attempt={}, consumer={}]",
            self.src_task_index, self.attempt_number, self.consumer
        )
    }
}
