//! Records exchanged between the scheduler and the cluster backend.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::ContainerId;

/// Amount of cluster resources requested for, or held by, a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resource {
    pub memory_mb: u64,
    pub virtual_cores: u32,
}

impl Resource {
    pub fn new(memory_mb: u64, virtual_cores: u32) -> Self {
        Self {
            memory_mb,
            virtual_cores,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<memory:{}MB, vCores:{}>", self.memory_mb, self.virtual_cores)
    }
}

/// Scheduling priority. Lower values are served first, matching the
/// backend's convention, so the value is passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(pub u32);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A container granted by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    /// Host of the node the container runs on.
    pub node_host: String,
    pub resource: Resource,
    pub priority: Priority,
}

impl Container {
    pub fn new(
        id: ContainerId,
        node_host: impl Into<String>,
        resource: Resource,
        priority: Priority,
    ) -> Self {
        Self {
            id,
            node_host: node_host.into(),
            resource,
            priority,
        }
    }
}

/// Why a container terminated, as reported by the cluster manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatus {
    Success,
    /// Killed by the framework, e.g. on release.
    Aborted,
    /// The node's local disks failed.
    DisksFailed,
    /// Reclaimed by the cluster manager for another application.
    Preempted,
    Invalid,
    /// Any other process exit code.
    Other(i32),
}

impl ExitStatus {
    pub const SUCCESS_CODE: i32 = 0;
    pub const ABORTED_CODE: i32 = -100;
    pub const DISKS_FAILED_CODE: i32 = -101;
    pub const PREEMPTED_CODE: i32 = -102;
    pub const INVALID_CODE: i32 = -1000;

    /// Map a raw cluster-manager exit code.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::SUCCESS_CODE => Self::Success,
            Self::ABORTED_CODE => Self::Aborted,
            Self::DISKS_FAILED_CODE => Self::DisksFailed,
            Self::PREEMPTED_CODE => Self::Preempted,
            Self::INVALID_CODE => Self::Invalid,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::Success => Self::SUCCESS_CODE,
            Self::Aborted => Self::ABORTED_CODE,
            Self::DisksFailed => Self::DISKS_FAILED_CODE,
            Self::Preempted => Self::PREEMPTED_CODE,
            Self::Invalid => Self::INVALID_CODE,
            Self::Other(code) => *code,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(code) => write!(f, "exit code {}", code),
            status => write!(f, "{:?} ({})", status, status.code()),
        }
    }
}

/// "Run me near the container that produced this source task's output."
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskLocationHint {
    pub vertex_name: String,
    pub task_index: u32,
}

impl TaskLocationHint {
    pub fn new(vertex_name: impl Into<String>, task_index: u32) -> Self {
        Self {
            vertex_name: vertex_name.into(),
            task_index,
        }
    }
}
