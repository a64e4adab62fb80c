//! Fetched input lifecycle
//!
//! A [`FetchedInput`] stages the bytes of one shuffle transfer. Bytes are
//! written to a temporary location while the input is PENDING, published
//! atomically to the final location on commit, and reclaimed on free:
//!
//! ```text
//! PENDING --commit--> COMMITTED --free--> FREED
//!    |                                      ^
//!    +----abort-----> ABORTED -----free-----+
//! ```
//!
//! Every transition runs under one guard over the state value, so a transfer
//! racing a cleanup sweep on the same input sees a single winner. Repeated
//! `commit`/`abort` calls are no-ops; `free` on a PENDING input is a caller
//! bug and panics.

use async_trait::async_trait;
use stagecoach_common::{FetchError, FetchResult, InputAttemptIdentifier};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::shuffle::disk::DiskStorage;
use crate::shuffle::memory::MemoryStorage;

static NEXT_FETCHED_INPUT_ID: AtomicU64 = AtomicU64::new(0);

/// Next process-wide fetched-input instance id. Monotonically increasing.
fn next_fetched_input_id() -> u64 {
    NEXT_FETCHED_INPUT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle state of a fetched input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchedInputState {
    Pending,
    Committed,
    Aborted,
    Freed,
}

impl fmt::Display for FetchedInputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FetchedInputState::Pending => "PENDING",
            FetchedInputState::Committed => "COMMITTED",
            FetchedInputState::Aborted => "ABORTED",
            FetchedInputState::Freed => "FREED",
        };
        f.write_str(name)
    }
}

/// Medium backing a fetched input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchedInputKind {
    Memory,
    Disk,
}

/// Immutable description of a fetched input, handed to callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedInputHeader {
    pub id: u64,
    pub kind: FetchedInputKind,
    /// Declared size in bytes, known before the transfer.
    pub size: u64,
    pub input_attempt: InputAttemptIdentifier,
}

/// Notifications raised by fetched-input transitions, each at most once per
/// input.
pub trait FetchCallback: Send + Sync {
    /// PENDING -> COMMITTED.
    fn fetch_complete(&self, input: &FetchedInputHeader);

    /// PENDING -> ABORTED.
    fn fetch_failed(&self, input: &FetchedInputHeader);

    /// COMMITTED -> FREED.
    fn free_resources(&self, input: &FetchedInputHeader);
}

/// Writer for incoming bytes, bound to the temporary location. Writes fail
/// once the medium publishes, discards or hands out a newer sink.
pub type OutputSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Reader for committed bytes, bound to the final location.
pub type InputSource = Box<dyn AsyncRead + Send + Unpin>;

/// Storage operations a fetched input needs from its medium.
///
/// Implementations never see state; the owning [`FetchedInput`] only calls
/// each operation from the state that allows it.
#[async_trait]
pub trait FetchedInputStorage: Send + Sync + fmt::Debug {
    fn kind(&self) -> FetchedInputKind;

    /// Open a fresh writer at the temporary location, cutting off any earlier
    /// writer.
    async fn open_sink(&self) -> FetchResult<OutputSink>;

    /// Open a reader at the final location.
    async fn open_source(&self) -> FetchResult<InputSource>;

    /// Atomically make the temporary contents visible at the final location.
    async fn publish(&self) -> FetchResult<()>;

    /// Discard the temporary contents.
    async fn discard(&self) -> FetchResult<()>;

    /// Delete the final contents. Missing contents are not an error.
    async fn release(&self) -> FetchResult<()>;
}

/// Staged data for one shuffle transfer attempt.
pub struct FetchedInput {
    header: FetchedInputHeader,
    state: Mutex<FetchedInputState>,
    storage: Box<dyn FetchedInputStorage>,
    callback: Arc<dyn FetchCallback>,
}

impl FetchedInput {
    /// Create an input staged on local disk under `final_path`.
    ///
    /// The temporary path is `final_path` suffixed with this input's id, so
    /// concurrent fetches of the same source never collide.
    pub fn new_disk(
        size: u64,
        input_attempt: InputAttemptIdentifier,
        final_path: PathBuf,
        callback: Arc<dyn FetchCallback>,
    ) -> Self {
        Self::with_storage(
            size,
            input_attempt,
            |id| Box::new(DiskStorage::new(final_path, id)),
            callback,
        )
    }

    /// Create an input staged in memory.
    pub fn new_memory(
        size: u64,
        input_attempt: InputAttemptIdentifier,
        callback: Arc<dyn FetchCallback>,
    ) -> Self {
        Self::with_storage(
            size,
            input_attempt,
            |_| Box::new(MemoryStorage::new()),
            callback,
        )
    }

    /// Create an input over any storage medium. The input allocates its own
    /// id and hands it to `storage` to build the medium.
    pub fn with_storage(
        size: u64,
        input_attempt: InputAttemptIdentifier,
        storage: impl FnOnce(u64) -> Box<dyn FetchedInputStorage>,
        callback: Arc<dyn FetchCallback>,
    ) -> Self {
        let id = next_fetched_input_id();
        let storage = storage(id);
        let header = FetchedInputHeader {
            id,
            kind: storage.kind(),
            size,
            input_attempt,
        };
        Self {
            header,
            state: Mutex::new(FetchedInputState::Pending),
            storage,
            callback,
        }
    }

    pub fn header(&self) -> &FetchedInputHeader {
        &self.header
    }

    pub fn id(&self) -> u64 {
        self.header.id
    }

    pub fn size(&self) -> u64 {
        self.header.size
    }

    pub fn kind(&self) -> FetchedInputKind {
        self.header.kind
    }

    pub fn input_attempt(&self) -> &InputAttemptIdentifier {
        &self.header.input_attempt
    }

    pub async fn state(&self) -> FetchedInputState {
        *self.state.lock().await
    }

    /// Writer for incoming bytes. Only available while PENDING.
    pub async fn output_sink(&self) -> FetchResult<OutputSink> {
        let state = self.state.lock().await;
        self.require(*state, FetchedInputState::Pending, "open an output sink")?;
        self.storage.open_sink().await
    }

    /// Reader for the published bytes. Only available once COMMITTED.
    pub async fn input_source(&self) -> FetchResult<InputSource> {
        let state = self.state.lock().await;
        self.require(*state, FetchedInputState::Committed, "open an input source")?;
        self.storage.open_source().await
    }

    /// Publish the staged bytes and notify "fetch complete".
    ///
    /// No-op unless PENDING. On a storage failure the input stays PENDING
    /// and the error is returned.
    pub async fn commit(&self) -> FetchResult<()> {
        let mut state = self.state.lock().await;
        if *state != FetchedInputState::Pending {
            debug!(
                input = self.header.id,
                state = %state.to_string(),
                "commit ignored, input already resolved"
            );
            return Ok(());
        }

        self.storage.publish().await?;
        *state = FetchedInputState::Committed;
        debug!(
            input = self.header.id,
            attempt = %self.header.input_attempt,
            "committed fetched input"
        );
        self.callback.fetch_complete(&self.header);
        Ok(())
    }

    /// Discard the staged bytes and notify "fetch failed".
    ///
    /// No-op unless PENDING. On a storage failure the input stays PENDING
    /// and the error is returned.
    pub async fn abort(&self) -> FetchResult<()> {
        let mut state = self.state.lock().await;
        if *state != FetchedInputState::Pending {
            debug!(
                input = self.header.id,
                state = %state.to_string(),
                "abort ignored, input already resolved"
            );
            return Ok(());
        }

        self.storage.discard().await?;
        *state = FetchedInputState::Aborted;
        debug!(
            input = self.header.id,
            attempt = %self.header.input_attempt,
            "aborted fetched input"
        );
        self.callback.fetch_failed(&self.header);
        Ok(())
    }

    /// Reclaim the input's storage.
    ///
    /// Deleting committed data is best effort: a failure is logged and left
    /// for a later sweep. Freeing twice is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the input is still PENDING; it must be committed or aborted
    /// first.
    pub async fn free(&self) {
        let mut state = self.state.lock().await;
        assert!(
            *state != FetchedInputState::Pending,
            "fetched input {} can only be freed after it is committed or aborted",
            self.header.id
        );

        match *state {
            FetchedInputState::Committed => {
                if let Err(e) = self.storage.release().await {
                    warn!(input = self.header.id, error = %e, "failed to remove fetched input");
                }
                *state = FetchedInputState::Freed;
                self.callback.free_resources(&self.header);
            }
            FetchedInputState::Aborted => *state = FetchedInputState::Freed,
            FetchedInputState::Pending | FetchedInputState::Freed => {}
        }
    }

    fn require(
        &self,
        state: FetchedInputState,
        expected: FetchedInputState,
        operation: &'static str,
    ) -> FetchResult<()> {
        if state == expected {
            Ok(())
        } else {
            Err(FetchError::InvalidState {
                id: self.header.id,
                state: state.to_string(),
                operation,
            })
        }
    }
}

impl fmt::Debug for FetchedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("FetchedInput");
        debug
            .field("id", &self.header.id)
            .field("kind", &self.header.kind)
            .field("size", &self.header.size)
            .field("input_attempt", &self.header.input_attempt)
            .field("storage", &self.storage);
        match self.state.try_lock() {
            Ok(state) => debug.field("state", &*state),
            Err(_) => debug.field("state", &"<in transition>"),
        };
        debug.finish()
    }
}
