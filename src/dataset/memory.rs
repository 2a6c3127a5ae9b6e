//! In-memory dataset.

use std::collections::BTreeMap;

use super::{Added, Dataset};
use crate::error::{Error, Result};
use crate::model::{Element, Key};

/// What `add` does when the key is already present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddPolicy {
    /// Replace the stored content in place.
    #[default]
    Replace,
    /// Reject with `Error::DuplicateKey`.
    Reject,
}

/// A `BTreeMap`-backed [`Dataset`].
///
/// Iteration is in ascending key order, so every pass over a
/// `MemoryDataset` visits keys deterministically.
#[derive(Debug, Clone)]
pub struct MemoryDataset<E> {
    elements: BTreeMap<Key, E>,
    policy: AddPolicy,
}

impl<E> Default for MemoryDataset<E> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            policy: AddPolicy::Replace,
        }
    }
}

impl<E: Element> MemoryDataset<E> {
    /// Create an empty dataset that replaces on duplicate `add`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty dataset whose `add` rejects existing keys.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            elements: BTreeMap::new(),
            policy: AddPolicy::Reject,
        }
    }

    /// Build a dataset from initial data.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if two elements share a key: there is no
    /// way to tell which of them should win.
    pub fn from_elements<I>(elements: I) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
    {
        let mut dataset = Self::strict();
        for element in elements {
            dataset.add(element)?;
        }
        dataset.policy = AddPolicy::Replace;
        Ok(dataset)
    }

    #[must_use]
    pub fn policy(&self) -> AddPolicy {
        self.policy
    }

    /// Smallest and largest key, if any.
    #[must_use]
    pub fn key_range(&self) -> Option<(&Key, &Key)> {
        let first = self.elements.keys().next()?;
        let last = self.elements.keys().next_back()?;
        Some((first, last))
    }

    /// Consume the dataset, yielding elements in key order.
    pub fn into_elements(self) -> impl Iterator<Item = E> {
        self.elements.into_values()
    }
}

impl<E: Element> Dataset<E> for MemoryDataset<E> {
    fn get(&self, key: &Key) -> Result<&E> {
        self.elements
            .get(key)
            .ok_or_else(|| Error::NotFound { key: key.clone() })
    }

    fn get_mut(&mut self, key: &Key) -> Result<&mut E> {
        self.elements
            .get_mut(key)
            .ok_or_else(|| Error::NotFound { key: key.clone() })
    }

    fn add(&mut self, element: E) -> Result<Added> {
        match self.elements.get_mut(element.key()) {
            Some(existing) => {
                if self.policy == AddPolicy::Reject {
                    return Err(Error::DuplicateKey {
                        key: element.key().clone(),
                    });
                }
                if existing.content() == element.content() {
                    return Ok(Added::Unchanged);
                }
                existing.update(element.content().clone());
                Ok(Added::Updated)
            }
            None => {
                self.elements.insert(element.key().clone(), element);
                Ok(Added::Inserted)
            }
        }
    }

    fn pop(&mut self, key: &Key) -> Result<E> {
        self.elements
            .remove(key)
            .ok_or_else(|| Error::NotFound { key: key.clone() })
    }

    fn contains(&self, key: &Key) -> bool {
        self.elements.contains_key(key)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &E> + '_> {
        Box::new(self.elements.values())
    }

    fn len(&self) -> usize {
        self.elements.len()
    }

    fn keys(&self) -> Vec<Key> {
        self.elements.keys().cloned().collect()
    }

    fn clear(&mut self) {
        self.elements.clear();
    }
}

impl<E: Element> FromIterator<E> for MemoryDataset<E> {
    /// Collect with replace semantics: the last element for a key wins.
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut elements = BTreeMap::new();
        for element in iter {
            elements.insert(element.key().clone(), element);
        }
        Self {
            elements,
            policy: AddPolicy::Replace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Record;

    #[test]
    fn test_get_add_pop() {
        let mut ds: MemoryDataset<Record> = MemoryDataset::new();
        assert!(ds.is_empty());

        assert_eq!(ds.add(Record::bare(0)).unwrap(), Added::Inserted);
        assert!(ds.contains(&Key::from(0)));
        assert_eq!(ds.get(&Key::from(0)).unwrap().key(), &Key::from(0));

        assert!(matches!(ds.get(&Key::from(1)), Err(Error::NotFound { .. })));
        assert!(matches!(ds.pop(&Key::from(1)), Err(Error::NotFound { .. })));

        let popped = ds.pop(&Key::from(0)).unwrap();
        assert_eq!(popped.key(), &Key::from(0));
        assert!(ds.is_empty());
    }

    #[test]
    fn test_add_replaces_content_in_place() {
        let mut ds: MemoryDataset<Record> = MemoryDataset::new();
        ds.add(Record::bare("k").with("v", 1)).unwrap();

        assert_eq!(ds.add(Record::bare("k").with("v", 1)).unwrap(), Added::Unchanged);
        assert_eq!(ds.add(Record::bare("k").with("v", 2)).unwrap(), Added::Updated);
        assert_eq!(ds.len(), 1);
        assert_eq!(
            ds.get(&Key::from("k")).unwrap().property("v"),
            Some(&serde_json::json!(2))
        );
    }

    #[test]
    fn test_strict_rejects_overwrite() {
        let mut ds: MemoryDataset<Record> = MemoryDataset::strict();
        ds.add(Record::bare(1)).unwrap();
        let err = ds.add(Record::bare(1).with("v", 2)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_from_elements_rejects_duplicates() {
        let err = MemoryDataset::from_elements([Record::bare(0), Record::bare(0), Record::bare(1)])
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { key } if key == Key::from(0)));

        let ds = MemoryDataset::from_elements([Record::bare(0), Record::bare(1)]).unwrap();
        assert_eq!(ds.policy(), AddPolicy::Replace);
    }

    #[test]
    fn test_iteration_is_key_ordered_and_restartable() {
        let ds: MemoryDataset<Record> =
            [Record::bare(3), Record::bare(1), Record::bare(2)].into_iter().collect();

        let first: Vec<Key> = ds.iter().map(|e| e.key().clone()).collect();
        let second = ds.keys();
        assert_eq!(first, vec![Key::from(1), Key::from(2), Key::from(3)]);
        assert_eq!(first, second);
        assert_eq!(ds.key_range(), Some((&Key::from(1), &Key::from(3))));
    }

    #[test]
    fn test_update_in_place() {
        let mut ds: MemoryDataset<Record> = MemoryDataset::new();
        ds.add(Record::bare(0).with("a", 1)).unwrap();

        let content = Record::bare(0).with("a", 2).content().clone();
        assert!(ds.update(&Key::from(0), content.clone()).unwrap());
        assert!(!ds.update(&Key::from(0), content.clone()).unwrap());
        assert!(ds.update(&Key::from(9), content).is_err());
    }
}
