//! Reversible operations and the pure helpers they share.

/// Per-day effort distribution.
pub mod allocation;
/// Operation trait, the five board operations and their registry.
pub mod registry;
/// Log payload stripping.
pub mod sanitize;
