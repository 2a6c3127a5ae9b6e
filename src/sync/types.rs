//! Sync types for change logs and run summaries.
//!
//! This module defines the record types written to JSONL change logs and the
//! statistics reported after a load.

use serde::{Deserialize, Serialize};

use super::hash::content_hash;
use super::strategy::Strategy;
use crate::dataset::{Dataset, DiffDataset};
use crate::model::{ChangeTracker, Content, Element, Key};

/// Tagged union for change-log lines.
///
/// Each line in a change log is one of these records, discriminated by the
/// `type` field:
/// `{"type":"added","key":["k2"],"content":{...},"content_hash":"..."}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeRecord {
    /// A key inserted into the destination.
    Added {
        key: Key,
        content: Content,
        content_hash: String,
    },
    /// A key removed from the destination, with its last known content.
    Removed {
        key: Key,
        content: Content,
        content_hash: String,
    },
    /// A key whose content was replaced.
    Changed {
        key: Key,
        before: Content,
        after: Content,
        /// Hash of `after`.
        content_hash: String,
    },
}

impl ChangeRecord {
    /// The key this record is about.
    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            Self::Added { key, .. } | Self::Removed { key, .. } | Self::Changed { key, .. } => key,
        }
    }

    /// Collect the change records of one recording epoch, in the order a
    /// store applies them: additions, changes, then removals.
    pub fn from_diff<E, D>(diff: &DiffDataset<E, D>) -> Vec<Self>
    where
        E: Element + Clone,
        D: Dataset<ChangeTracker<E>>,
    {
        let mut records = Vec::new();
        for element in diff.added_elements() {
            records.push(Self::Added {
                key: element.key().clone(),
                content: element.content().clone(),
                content_hash: content_hash(element.content()),
            });
        }
        for (before, element) in diff.changed_elements() {
            records.push(Self::Changed {
                key: element.key().clone(),
                before: before.clone(),
                after: element.content().clone(),
                content_hash: content_hash(element.content()),
            });
        }
        for element in diff.removed_elements() {
            records.push(Self::Removed {
                key: element.key().clone(),
                content: element.content().clone(),
                content_hash: content_hash(element.content()),
            });
        }
        records
    }
}

/// Statistics for a single loader run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Unique identifier of this run.
    pub run_id: String,
    /// RFC 3339 start time of the run.
    pub started_at: String,
    /// Reconciler applied to every chunk.
    pub strategy: Strategy,
    /// Configured chunk size.
    pub chunk_size: usize,
    /// Number of chunks reconciled.
    pub chunks: usize,
    /// Elements received from the source stream.
    pub source_records: usize,
    /// Elements received from the destination stream.
    pub destination_records: usize,
    /// Keys added to the destination.
    pub added: usize,
    /// Keys removed from the destination.
    pub removed: usize,
    /// Keys whose content changed.
    pub changed: usize,
}

impl LoadSummary {
    /// Create an empty summary for a new run.
    #[must_use]
    pub fn new(strategy: Strategy, chunk_size: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: chrono::Utc::now().to_rfc3339(),
            strategy,
            chunk_size,
            ..Self::default()
        }
    }

    /// Total number of recorded changes.
    #[must_use]
    pub fn total_changes(&self) -> usize {
        self.added + self.removed + self.changed
    }

    /// True if the run left the destination untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.total_changes() == 0
    }
}
