//! Error handling for the stagecoach crates.

use std::path::PathBuf;

use thiserror::Error;

use crate::ids::{ContainerId, TaskAttemptId};

/// Errors produced while processing a scheduler event.
///
/// Each variant is the failure of a single event; the event worker keeps
/// running after any of them.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A completion report named a container the registry never learned about.
    #[error("Unknown container {container_id} in completion report for attempt {attempt}")]
    UnknownContainer {
        container_id: ContainerId,
        attempt: String,
    },

    /// The resource-allocation backend rejected or failed a call.
    #[error("Backend call failed for {subject}: {message}")]
    Backend {
        subject: String,
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Scheduler event processor is stopped")]
    ProcessorStopped,

    #[error("Scheduler event processor was already started")]
    AlreadyStarted,
}

impl SchedulerError {
    /// Create a backend error for a call made on behalf of a task attempt.
    pub fn backend_for_attempt<S: Into<String>, E: Into<anyhow::Error>>(
        attempt: &TaskAttemptId,
        message: S,
        source: E,
    ) -> Self {
        Self::Backend {
            subject: attempt.to_string(),
            message: message.into(),
            source: source.into(),
        }
    }

    /// Create a backend error for a call made on behalf of a container.
    pub fn backend_for_container<S: Into<String>, E: Into<anyhow::Error>>(
        container_id: &ContainerId,
        message: S,
        source: E,
    ) -> Self {
        Self::Backend {
            subject: container_id.to_string(),
            message: message.into(),
            source: source.into(),
        }
    }

    /// Whether resubmitting the same event could succeed.
    ///
    /// A registry gap cannot be fixed by retrying; a backend failure may be
    /// re-driven by the upstream task logic.
    pub fn is_retryable(&self) -> bool {
        match self {
            SchedulerError::UnknownContainer { .. } => false,
            SchedulerError::Backend { .. } => true,
            SchedulerError::ProcessorStopped => false,
            SchedulerError::AlreadyStarted => false,
        }
    }
}

/// Errors produced by the fetched-input lifecycle.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The backing storage failed during a data-integrity-affecting step.
    #[error("Storage operation failed: {message}")]
    Storage {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// An operation was requested in a state that does not allow it.
    #[error("Fetched input {id} is {state}, cannot {operation}")]
    InvalidState {
        id: u64,
        state: String,
        operation: &'static str,
    },

    #[error("No local directory is configured for disk-backed fetched inputs")]
    NoLocalDirs,
}

impl FetchError {
    /// Create a storage error bound to the path that failed.
    pub fn storage_with_path<S: Into<String>>(
        message: S,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            path: Some(path.into()),
            source,
        }
    }

    pub fn storage<S: Into<String>>(message: S, source: std::io::Error) -> Self {
        Self::Storage {
            message: message.into(),
            path: None,
            source,
        }
    }
}

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Result type alias for fetched-input operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
