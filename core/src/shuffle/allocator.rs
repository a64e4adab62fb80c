//! Fetched input allocation.
//!
//! Chooses the medium for each incoming shuffle transfer and tracks the
//! memory those transfers hold. The allocator is also the [`FetchCallback`]
//! of every input it creates, so memory reservations are returned as soon as
//! an input is aborted or freed.

use stagecoach_common::{FetchResult, InputAttemptIdentifier, ShuffleConfig};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, trace};

use crate::shuffle::fetched_input::{
    FetchCallback, FetchedInput, FetchedInputHeader, FetchedInputKind,
};

/// Allocation statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    pub memory_used_bytes: u64,
    pub memory_inputs: usize,
    pub disk_inputs: usize,
    pub completed_inputs: usize,
}

#[derive(Debug, Default)]
struct AllocatorState {
    memory_used: u64,
    /// Bytes reserved per live memory input, by instance id.
    reservations: HashMap<u64, u64>,
    disk_inputs: usize,
    completed: Vec<FetchedInputHeader>,
}

#[derive(Debug)]
pub struct FetchedInputAllocator {
    config: ShuffleConfig,
    state: Mutex<AllocatorState>,
}

impl FetchedInputAllocator {
    pub fn new(config: ShuffleConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(AllocatorState::default()),
        })
    }

    /// Allocate a fetched input for `size` bytes from `input_attempt`.
    ///
    /// Inputs no larger than the single-fetch limit go to memory while the
    /// memory budget allows; everything else is staged on disk.
    pub fn allocate(
        self: &Arc<Self>,
        size: u64,
        input_attempt: InputAttemptIdentifier,
    ) -> FetchResult<FetchedInput> {
        let callback: Arc<dyn FetchCallback> = Arc::clone(self) as Arc<dyn FetchCallback>;

        {
            let mut state = self.lock_state();
            if self.fits_in_memory(&state, size) {
                let input = FetchedInput::new_memory(size, input_attempt, callback);
                state.memory_used += size;
                state.reservations.insert(input.id(), size);
                debug!(
                    input = input.id(),
                    size,
                    memory_used = state.memory_used,
                    "allocated memory fetched input"
                );
                return Ok(input);
            }
        }

        let final_path = self.disk_path_for(&input_attempt)?;
        let input = FetchedInput::new_disk(size, input_attempt, final_path, callback);
        self.lock_state().disk_inputs += 1;
        debug!(input = input.id(), size, "allocated disk fetched input");
        Ok(input)
    }

    /// Headers of the committed inputs that have not been freed yet, in commit
    /// order.
    pub fn completed_inputs(&self) -> Vec<FetchedInputHeader> {
        self.lock_state().completed.clone()
    }

    pub fn memory_used(&self) -> u64 {
        self.lock_state().memory_used
    }

    pub fn stats(&self) -> AllocatorStats {
        let state = self.lock_state();
        AllocatorStats {
            memory_used_bytes: state.memory_used,
            memory_inputs: state.reservations.len(),
            disk_inputs: state.disk_inputs,
            completed_inputs: state.completed.len(),
        }
    }

    fn fits_in_memory(&self, state: &AllocatorState, size: u64) -> bool {
        size <= self.config.max_single_memory_fetch_bytes
            && state
                .memory_used
                .checked_add(size)
                .is_some_and(|used| used <= self.config.memory_limit_bytes)
    }

    /// `<local dir>/<consumer task>/input_<src task index>.out`
    fn disk_path_for(&self, input_attempt: &InputAttemptIdentifier) -> FetchResult<PathBuf> {
        let dir = self.config.local_dir_for(input_attempt.src_task_index)?;
        Ok(dir
            .join(input_attempt.consumer.to_string())
            .join(format!("input_{}.out", input_attempt.src_task_index)))
    }

    fn release(&self, input: &FetchedInputHeader) {
        let mut state = self.lock_state();
        state.completed.retain(|header| header.id != input.id);
        match input.kind {
            FetchedInputKind::Memory => {
                if let Some(size) = state.reservations.remove(&input.id) {
                    state.memory_used = state.memory_used.saturating_sub(size);
                    trace!(input = input.id, size, "released memory reservation");
                }
            }
            FetchedInputKind::Disk => state.disk_inputs = state.disk_inputs.saturating_sub(1),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AllocatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FetchCallback for FetchedInputAllocator {
    fn fetch_complete(&self, input: &FetchedInputHeader) {
        debug!(input = input.id, attempt = %input.input_attempt, "fetch complete");
        self.lock_state().completed.push(input.clone());
    }

    fn fetch_failed(&self, input: &FetchedInputHeader) {
        debug!(input = input.id, attempt = %input.input_attempt, "fetch failed");
        self.release(input);
    }

    fn free_resources(&self, input: &FetchedInputHeader) {
        self.release(input);
    }
}
