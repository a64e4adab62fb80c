//! Events consumed and produced by the scheduler event processor.

use stagecoach_common::{
    Container, ContainerId, ExitStatus, Priority, Resource, TaskAttemptId, TaskLocationHint,
};
use tokio::sync::mpsc;
use tracing::warn;

/// Placement request for one task attempt that needs a container.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest {
    pub attempt_id: TaskAttemptId,
    pub resource: Resource,
    pub priority: Priority,
    /// Run near the container of a prior successful source attempt.
    pub location_hint: Option<TaskLocationHint>,
    /// Explicit hosts; when present, used verbatim instead of the hint.
    pub hosts: Option<Vec<String>>,
    /// Racks passed to the backend as placement hints.
    pub racks: Option<Vec<String>>,
}

impl PlacementRequest {
    pub fn new(attempt_id: TaskAttemptId, resource: Resource, priority: Priority) -> Self {
        Self {
            attempt_id,
            resource,
            priority,
            location_hint: None,
            hosts: None,
            racks: None,
        }
    }

    pub fn with_location_hint(mut self, hint: TaskLocationHint) -> Self {
        self.location_hint = Some(hint);
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = Some(hosts);
        self
    }

    pub fn with_racks(mut self, racks: Vec<String>) -> Self {
        self.racks = Some(racks);
        self
    }
}

/// Container termination notification from the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReport {
    pub container_id: ContainerId,
    pub exit_status: ExitStatus,
    /// Free text supplied by the backend.
    pub diagnostics: String,
    /// The attempt that was running in the container, if known.
    pub attempt_id: Option<TaskAttemptId>,
}

/// Events accepted by the scheduler event processor.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A task attempt is ready to run and needs a container.
    LaunchRequest(PlacementRequest),
    /// A task attempt finished; the backend may reuse or release its container.
    AttemptEnded {
        attempt_id: TaskAttemptId,
        succeeded: bool,
    },
    /// The application no longer needs a container.
    ContainerDeallocate { container_id: ContainerId },
    /// The backend granted `container` to `attempt_id`.
    TaskAllocated {
        attempt_id: TaskAttemptId,
        container: Container,
    },
    /// The backend reported a container terminated.
    ContainerCompleted(CompletionReport),
    /// Completes once every event submitted before it has been processed.
    Barrier,
}

impl SchedulerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerEvent::LaunchRequest(_) => "launch_request",
            SchedulerEvent::AttemptEnded { .. } => "attempt_ended",
            SchedulerEvent::ContainerDeallocate { .. } => "container_deallocate",
            SchedulerEvent::TaskAllocated { .. } => "task_allocated",
            SchedulerEvent::ContainerCompleted(_) => "container_completed",
            SchedulerEvent::Barrier => "barrier",
        }
    }
}

/// Payload of a "container completed" event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerCompletedEvent {
    pub container_id: ContainerId,
    pub diagnostics: String,
    pub is_preempted: bool,
    pub is_disk_failed: bool,
}

/// Type tag of a [`ContainerEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerEventType {
    Completed,
    AssignAttempt,
}

/// Events sent to the container lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    Completed(ContainerCompletedEvent),
    AssignAttempt {
        container_id: ContainerId,
        attempt_id: TaskAttemptId,
    },
}

impl ContainerEvent {
    pub fn event_type(&self) -> ContainerEventType {
        match self {
            ContainerEvent::Completed(_) => ContainerEventType::Completed,
            ContainerEvent::AssignAttempt { .. } => ContainerEventType::AssignAttempt,
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        match self {
            ContainerEvent::Completed(event) => &event.container_id,
            ContainerEvent::AssignAttempt { container_id, .. } => container_id,
        }
    }
}

/// Receiving side of the container lifecycle manager's event channel.
pub trait ContainerEventHandler: Send + Sync {
    fn handle(&self, event: ContainerEvent);
}

impl ContainerEventHandler for mpsc::UnboundedSender<ContainerEvent> {
    fn handle(&self, event: ContainerEvent) {
        if let Err(e) = self.send(event) {
            warn!(
                container = %e.0.container_id(),
                "container lifecycle manager is gone, dropping event"
            );
        }
    }
}
