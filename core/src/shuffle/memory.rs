//! In-memory storage for fetched inputs.

use async_trait::async_trait;
use stagecoach_common::{FetchError, FetchResult};
use std::io::{self, Cursor};
use std::sync::{Arc, Mutex, PoisonError};

use crate::shuffle::fetched_input::{
    FetchedInputKind, FetchedInputStorage, InputSource, OutputSink,
};
use crate::shuffle::sink::SinkSlot;

/// Bytes are staged in a buffer owned by the current sink and swapped into a
/// shared, immutable buffer on publish. Each sink gets its own buffer; opening
/// a new sink or publishing cuts off the previous one.
///
/// The buffer grows with the bytes actually written, never with the declared
/// size of the transfer.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    sink: Mutex<Option<SinkSlot<Vec<u8>>>>,
    published: Mutex<Option<Arc<[u8]>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn detach_sink(&self) -> Option<Vec<u8>> {
        let slot = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        slot.and_then(|slot| slot.detach())
    }
}

#[async_trait]
impl FetchedInputStorage for MemoryStorage {
    fn kind(&self) -> FetchedInputKind {
        FetchedInputKind::Memory
    }

    async fn open_sink(&self) -> FetchResult<OutputSink> {
        let slot = SinkSlot::new(Vec::new());
        let writer = slot.writer();
        let previous = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(slot);
        if let Some(previous) = previous {
            previous.detach();
        }
        Ok(Box::new(writer))
    }

    async fn open_source(&self) -> FetchResult<InputSource> {
        let published = self
            .published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match published {
            Some(data) => Ok(Box::new(Cursor::new(data))),
            None => Err(FetchError::storage(
                "No published data in memory",
                io::Error::from(io::ErrorKind::NotFound),
            )),
        }
    }

    async fn publish(&self) -> FetchResult<()> {
        let data = self.detach_sink().unwrap_or_default();
        *self.published.lock().unwrap_or_else(PoisonError::into_inner) = Some(data.into());
        Ok(())
    }

    async fn discard(&self) -> FetchResult<()> {
        self.detach_sink();
        Ok(())
    }

    async fn release(&self) -> FetchResult<()> {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
