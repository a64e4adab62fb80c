//! Configuration for the scheduler core and the shuffle staging area.
//!
//! Loading is left to the embedding application; these structs only carry
//! defaults and can be deserialized from JSON.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::FetchError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub shuffle: ShuffleConfig,
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Failed to parse engine configuration: {}", e))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read configuration file {}: {}", path.display(), e)
        })?;
        Self::from_json_str(&contents)
    }
}

/// Scheduler event processor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name of the event worker, used in logs.
    pub name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "scheduler-events".to_string(),
        }
    }
}

/// Shuffle staging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShuffleConfig {
    /// Directories that hold disk-backed fetched inputs.
    pub local_dirs: Vec<PathBuf>,
    /// Total bytes that memory-backed fetched inputs may hold at once.
    pub memory_limit_bytes: u64,
    /// Largest single input that may be staged in memory.
    pub max_single_memory_fetch_bytes: u64,
}

impl ShuffleConfig {
    /// Pick the local directory for a source task; spreads sources across disks.
    pub fn local_dir_for(&self, src_task_index: u32) -> Result<&Path, FetchError> {
        if self.local_dirs.is_empty() {
            return Err(FetchError::NoLocalDirs);
        }
        let slot = src_task_index as usize % self.local_dirs.len();
        Ok(self.local_dirs[slot].as_path())
    }
}

impl Default for ShuffleConfig {
    fn default() -> Self {
        Self {
            local_dirs: vec![std::env::temp_dir().join("stagecoach-shuffle")],
            memory_limit_bytes: 256 * 1024 * 1024,        // 256MB
            max_single_memory_fetch_bytes: 64 * 1024 * 1024, // 64MB
        }
    }
}
