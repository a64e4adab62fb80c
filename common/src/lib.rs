//! Common identifiers, records, errors and configuration for the
//! stagecoach scheduling core.

pub mod config;
pub mod error;
pub mod ids;
pub mod records;

pub use config::{EngineConfig, SchedulerConfig, ShuffleConfig};
pub use error::{FetchError, FetchResult, SchedulerError, SchedulerResult};
pub use ids::{ContainerId, DagId, InputAttemptIdentifier, TaskAttemptId, TaskId, VertexId};
pub use records::{Container, ExitStatus, Priority, Resource, TaskLocationHint};
