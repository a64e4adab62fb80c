//! Scheduler module
//!
//! This module translates task-attempt placement requests into allocation
//! calls against a pluggable resource-allocation backend, and classifies
//! container completions for the container lifecycle manager.

pub mod affinity;
pub mod backend;
pub mod container;
pub mod context;
pub mod dag;
pub mod event_processor;
pub mod events;

pub use affinity::resolve_affinity;
pub use backend::{AffinityTarget, AllocationRequest, TaskSchedulerBackend};
pub use container::ContainerMap;
pub use context::{AppContext, ContainerRegistry, DagView, SimpleAppContext, VertexInfo};
pub use dag::InMemoryDag;
pub use event_processor::{
    DISK_FAILED_DIAGNOSTICS_PREFIX, EventTicket, PREEMPTED_DIAGNOSTICS_PREFIX,
    SchedulerEventProcessor, classify_completion,
};
pub use events::{
    CompletionReport, ContainerCompletedEvent, ContainerEvent, ContainerEventHandler,
    ContainerEventType, PlacementRequest, SchedulerEvent,
};
