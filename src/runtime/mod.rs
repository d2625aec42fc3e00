//! Single-writer async runtime.

/// Handle and command loop implementation.
pub mod handle;

pub use handle::{BoardHandle, RuntimeConfig, RuntimeError, spawn_board};
