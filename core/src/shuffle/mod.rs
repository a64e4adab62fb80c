//! Staging of shuffle inputs fetched from upstream tasks.

pub mod allocator;
pub mod disk;
pub mod fetched_input;
pub mod memory;
mod sink;

pub use allocator::{AllocatorStats, FetchedInputAllocator};
pub use disk::{DiskStorage, temp_path_for};
pub use fetched_input::{
    FetchCallback, FetchedInput, FetchedInputHeader, FetchedInputKind, FetchedInputState,
    FetchedInputStorage, InputSource, OutputSink,
};
pub use memory::MemoryStorage;
