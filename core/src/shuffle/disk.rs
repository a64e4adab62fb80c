//! Local-disk storage for fetched inputs.

use async_trait::async_trait;
use stagecoach_common::{FetchError, FetchResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::shuffle::fetched_input::{
    FetchedInputKind, FetchedInputStorage, InputSource, OutputSink,
};
use crate::shuffle::sink::SinkSlot;

/// Temporary path for the fetched input `instance_id` that will land at
/// `final_path`: the final path suffixed with `.<instance_id>`.
pub fn temp_path_for(final_path: &Path, instance_id: u64) -> PathBuf {
    let mut path = final_path.as_os_str().to_owned();
    path.push(format!(".{}", instance_id));
    PathBuf::from(path)
}

/// Bytes are written to a per-instance temporary file and renamed onto the
/// final path on publish. The temporary file is taken away from its sink
/// before the rename.
#[derive(Debug)]
pub struct DiskStorage {
    final_path: PathBuf,
    temp_path: PathBuf,
    sink: Mutex<Option<SinkSlot<File>>>,
}

impl DiskStorage {
    pub fn new(final_path: PathBuf, instance_id: u64) -> Self {
        let temp_path = temp_path_for(&final_path, instance_id);
        Self {
            final_path,
            temp_path,
            sink: Mutex::new(None),
        }
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Cut off the current sink and wait for its buffered writes to land.
    async fn detach_sink(&self) -> std::io::Result<()> {
        let slot = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut file) = slot.and_then(|slot| slot.detach()) {
            file.flush().await?;
        }
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[async_trait]
impl FetchedInputStorage for DiskStorage {
    fn kind(&self) -> FetchedInputKind {
        FetchedInputKind::Disk
    }

    async fn open_sink(&self) -> FetchResult<OutputSink> {
        self.detach_sink().await.map_err(|e| {
            FetchError::storage_with_path("Failed to flush previous sink", &self.temp_path, e)
        })?;
        if let Some(parent) = self.temp_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                FetchError::storage_with_path("Failed to create fetch directory", parent, e)
            })?;
        }
        let file = File::create(&self.temp_path).await.map_err(|e| {
            FetchError::storage_with_path("Failed to create temporary file", &self.temp_path, e)
        })?;

        let slot = SinkSlot::new(file);
        let writer = slot.writer();
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(slot);
        Ok(Box::new(writer))
    }

    async fn open_source(&self) -> FetchResult<InputSource> {
        let file = File::open(&self.final_path).await.map_err(|e| {
            FetchError::storage_with_path("Failed to open fetched file", &self.final_path, e)
        })?;
        Ok(Box::new(file))
    }

    async fn publish(&self) -> FetchResult<()> {
        self.detach_sink().await.map_err(|e| {
            FetchError::storage_with_path("Failed to flush temporary file", &self.temp_path, e)
        })?;
        fs::rename(&self.temp_path, &self.final_path)
            .await
            .map_err(|e| {
                FetchError::storage_with_path(
                    format!("Failed to rename {}", self.temp_path.display()),
                    &self.final_path,
                    e,
                )
            })
    }

    async fn discard(&self) -> FetchResult<()> {
        // The bytes are thrown away, so a failed flush does not matter.
        let _ = self.detach_sink().await;
        remove_if_exists(&self.temp_path).await.map_err(|e| {
            FetchError::storage_with_path("Failed to delete temporary file", &self.temp_path, e)
        })
    }

    async fn release(&self) -> FetchResult<()> {
        remove_if_exists(&self.final_path).await.map_err(|e| {
            FetchError::storage_with_path("Failed to delete fetched file", &self.final_path, e)
        })
    }
}
