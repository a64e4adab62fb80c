//! Stagecoach Core - task placement and shuffle input staging for a DAG engine
//!
//! The [`scheduler`] module turns task placement requests and container
//! completion reports into calls on a pluggable resource-allocation backend,
//! one event at a time. The [`shuffle`] module stages the bytes each task
//! fetches from its upstream tasks, in memory or on local disk, with an
//! atomic commit.

pub mod logging;
pub mod scheduler;
pub mod shuffle;

pub use logging::init_tracing;
pub use scheduler::{
    AffinityTarget, AllocationRequest, AppContext, CompletionReport, ContainerEvent,
    ContainerEventHandler, DagView, EventTicket, InMemoryDag, PlacementRequest,
    SchedulerEvent, SchedulerEventProcessor, SimpleAppContext, TaskSchedulerBackend,
};
pub use shuffle::{
    FetchCallback, FetchedInput, FetchedInputAllocator, FetchedInputKind, FetchedInputState,
};
