//! Tracing setup for binaries and demos embedding the scheduler.

use tracing::Level;

/// Install a `fmt` subscriber capped at `level`.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place and return `false`.
pub fn init_tracing(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .is_ok()
}
