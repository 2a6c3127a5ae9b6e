//! Datasets: keyed containers of elements.
//!
//! A [`Dataset`] is very similar to a set keyed by natural identity, with the
//! difference that an element can be retrieved by key. Since elements with
//! equal keys may carry different content, retrieval is what lets the
//! reconciler compare the two sides.
//!
//! # Implementations
//!
//! - [`MemoryDataset`] - `BTreeMap`-backed store, iterates in key order
//! - [`DiffDataset`] - recording decorator reporting added/removed/changed keys

mod diff;
mod memory;

pub use diff::{Diff, DiffDataset};
pub use memory::{AddPolicy, MemoryDataset};

use crate::error::Result;
use crate::model::{Content, Element, Key};

/// Outcome of [`Dataset::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    /// The key was absent and the element was inserted.
    Inserted,
    /// The key was present and its content was replaced with different content.
    Updated,
    /// The key was present with equal content; nothing changed.
    Unchanged,
}

/// The operation set shared by every dataset variant.
///
/// At most one element per key is held at any time.
pub trait Dataset<E: Element> {
    /// Return the element stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key is absent.
    fn get(&self, key: &Key) -> Result<&E>;

    /// Mutable access to the element stored under `key`.
    ///
    /// Edits made through this reference bypass any recording the dataset
    /// does; recording variants offer an explicit hook to report them.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key is absent.
    fn get_mut(&mut self, key: &Key) -> Result<&mut E>;

    /// Insert `element`, or replace the content of the element already
    /// stored under its key (same key, same identity).
    ///
    /// # Errors
    ///
    /// Strict variants return `Error::DuplicateKey` instead of replacing.
    fn add(&mut self, element: E) -> Result<Added>;

    /// Remove and return the element stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key is absent.
    fn pop(&mut self, key: &Key) -> Result<E>;

    /// Replace the content of the element under `key` in place.
    ///
    /// Returns `true` if the content differed.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key is absent.
    fn update(&mut self, key: &Key, content: Content) -> Result<bool> {
        Ok(self.get_mut(key)?.update(content))
    }

    fn contains(&self, key: &Key) -> bool;

    /// Iterate over all elements. The sequence is finite and re-iterable.
    fn iter(&self) -> Box<dyn Iterator<Item = &E> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all keys, in iteration order.
    fn keys(&self) -> Vec<Key> {
        self.iter().map(|e| e.key().clone()).collect()
    }

    /// Remove every element.
    fn clear(&mut self);
}
