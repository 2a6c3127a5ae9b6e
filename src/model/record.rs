//! Importable elements.
//!
//! An element is composed of two parts:
//!
//! - A *natural key* used to identify *the same* entity across systems.
//! - A *content* mapping carrying the data that must be kept in sync.
//!
//! Two elements that are the same and have equal content are *in sync*.
//! Identity never looks at content: equality, hashing and ordering of
//! [`Record`] are defined by the key alone.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::key::Key;

/// Property name → value mapping.
///
/// Equality is structural: two contents are equal iff they hold the same
/// property names with equal JSON values.
pub type Content = BTreeMap<String, serde_json::Value>;

/// Identity + content contract for a single importable record.
///
/// `key` is fixed at construction. `update` is the only mutation path and
/// replaces the content wholesale.
pub trait Element {
    /// The natural key. Never changes for the lifetime of the element.
    fn key(&self) -> &Key;

    /// Current content.
    fn content(&self) -> &Content;

    /// Replace the content. Returns `true` if it differed from the previous one.
    fn update(&mut self, content: Content) -> bool;

    /// Put this element in sync with `other` by copying its content.
    ///
    /// Returns `true` if this element changed.
    fn sync_from<O: Element + ?Sized>(&mut self, other: &O) -> bool
    where
        Self: Sized,
    {
        if self.content() == other.content() {
            return false;
        }
        self.update(other.content().clone())
    }

    /// True when both elements are the same entity with equal content.
    fn in_sync_with<O: Element + ?Sized>(&self, other: &O) -> bool
    where
        Self: Sized,
    {
        self.key() == other.key() && self.content() == other.content()
    }
}

/// The default element: a key and a content map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    key: Key,
    #[serde(default)]
    content: Content,
}

impl Record {
    /// Create a record with the given key and content.
    #[must_use]
    pub fn new(key: impl Into<Key>, content: Content) -> Self {
        Self {
            key: key.into(),
            content,
        }
    }

    /// Create a record with no content.
    #[must_use]
    pub fn bare(key: impl Into<Key>) -> Self {
        Self::new(key, Content::new())
    }

    /// Builder-style helper to set one property.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.content.insert(name.to_string(), value.into());
        self
    }

    /// Read one property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.content.get(name)
    }

    /// Split into key and content.
    #[must_use]
    pub fn into_parts(self) -> (Key, Content) {
        (self.key, self.content)
    }
}

impl Element for Record {
    fn key(&self) -> &Key {
        &self.key
    }

    fn content(&self) -> &Content {
        &self.content
    }

    fn update(&mut self, content: Content) -> bool {
        let changed = self.content != content;
        self.content = content;
        changed
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Record {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Record {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}
