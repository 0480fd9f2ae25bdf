//! Snapshot and anchor persistence

mod in_memory;
mod json_file;

pub use in_memory::{InMemorySnapshotRepository, StaticAnchorSource};
pub use json_file::{JsonFileAnchorSource, JsonFileSnapshotRepository};
