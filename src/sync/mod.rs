//! Reconciliation and change reporting.
//!
//! This module holds the synchronization engine and its file plumbing:
//!
//! - **Strategies**: full sync (mirror) and additive sync (insert + update)
//! - **Hashing**: SHA256 content fingerprints for change logs
//! - **Types**: JSONL change records and load summaries
//! - **Files**: atomic writes and streaming JSONL reads
//!
//! # Architecture
//!
//! A reconciliation reads a source [`Dataset`](crate::dataset::Dataset) and
//! mutates a destination one. When the destination is a
//! [`DiffDataset`](crate::dataset::DiffDataset), the recorded diff becomes
//! the change report:
//! 1. `insert_missing` adds keys only present in the source
//! 2. `update_existing` replaces differing content
//! 3. `remove_stale` drops keys only present in the destination (full sync)
//!
//! # File Format
//!
//! Change logs contain one record per line with a `type` tag:
//! ```json
//! {"type":"changed","key":["k1"],"before":{"v":0},"after":{"v":1},"content_hash":"abc"}
//! ```
//!
//! # Example
//!
//! ```
//! use importsync::dataset::{DiffDataset, MemoryDataset};
//! use importsync::model::Record;
//! use importsync::sync::full_sync;
//!
//! let source = MemoryDataset::from_elements([Record::bare("k1").with("v", 1)]).unwrap();
//! let mut destination = DiffDataset::from_elements([Record::bare("k3")]).unwrap();
//!
//! full_sync(&source, &mut destination).unwrap();
//! assert_eq!(destination.diff().total(), 2);
//! ```

mod file;
mod hash;
mod strategy;
mod types;

pub use file::{JsonlReader, JsonlWriter, read_jsonl, write_jsonl};
pub use hash::content_hash;
pub use strategy::{
    Strategy, additive_sync, full_sync, insert_missing, remove_stale, update_existing,
};
pub use types::{ChangeRecord, LoadSummary};
