//! Contract of the pluggable resource-allocation backend.

use async_trait::async_trait;
use stagecoach_common::{ContainerId, Priority, Resource, TaskAttemptId};
use std::fmt;
use std::sync::Arc;

use crate::scheduler::events::PlacementRequest;

/// Where the backend should try to place a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AffinityTarget {
    /// Reuse, or run next to, this container.
    Container(ContainerId),
    Host(String),
}

impl fmt::Display for AffinityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffinityTarget::Container(id) => write!(f, "container:{}", id),
            AffinityTarget::Host(host) => write!(f, "host:{}", host),
        }
    }
}

/// Arguments of one allocation call.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub attempt_id: TaskAttemptId,
    pub resource: Resource,
    /// Possibly empty.
    pub affinity: Vec<AffinityTarget>,
    pub priority: Priority,
    pub placement_hints: Vec<String>,
    /// The placement request this allocation came from, for correlation.
    pub source: Arc<PlacementRequest>,
}

/// The cluster resource-allocation backend.
///
/// Retry policy belongs to the implementation: the scheduler calls each
/// method once per event and reports failures without retrying.
#[async_trait]
pub trait TaskSchedulerBackend: Send + Sync {
    /// Ask for a container to run an attempt.
    async fn allocate_task(&self, request: AllocationRequest) -> anyhow::Result<()>;

    /// An attempt no longer needs its container. A successful attempt's
    /// container may be reused for another attempt.
    async fn deallocate_task(
        &self,
        attempt_id: &TaskAttemptId,
        succeeded: bool,
    ) -> anyhow::Result<()>;

    /// Give a container back to the cluster.
    async fn release_container(&self, container_id: &ContainerId) -> anyhow::Result<()>;
}
