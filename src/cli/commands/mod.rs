//! Command implementations.

pub mod completions;
pub mod sync;
pub mod version;
