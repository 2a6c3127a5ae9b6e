//! Diff-recording dataset.
//!
//! [`DiffDataset`] remembers every addition, removal and content change done
//! to it since the last [`DiffDataset::reset`]. Using one as the destination
//! of a reconciliation lets the caller persist the outcome in batches
//! (inserts, updates, deletes) instead of rewriting everything.
//!
//! # Recording rules
//!
//! Within one recording epoch:
//!
//! - `add` of an absent key records it as *added*.
//! - `add`/`update` of a present key records it as *changed* only if the
//!   content now differs from the baseline taken at the start of the epoch.
//!   Restoring the baseline content clears the record.
//! - `pop` of a baseline key records it as *removed* and drops any *changed*
//!   record for it.
//! - `pop` of a key added in this epoch cancels the addition: the key is
//!   reported nowhere.
//! - `add` of a key removed in this epoch cancels the removal; the key is
//!   reported as *changed* iff the re-added content differs from the baseline.
//!
//! So a key is never both added and removed, and every changed key was
//! present before and after with differing content.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::{Added, Dataset, MemoryDataset};
use crate::error::Result;
use crate::model::{ChangeTracker, Content, Element, Key};

/// Snapshot of the keys recorded by a [`DiffDataset`], each list sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diff {
    pub added: Vec<Key>,
    pub removed: Vec<Key>,
    pub changed: Vec<Key>,
}

impl Diff {
    /// True if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Total number of recorded keys.
    #[must_use]
    pub fn total(&self) -> usize {
        self.added.len() + self.removed.len() + self.changed.len()
    }
}

/// A [`Dataset`] that records its own diff.
///
/// Elements are stored in an owned inner dataset wrapped in
/// [`ChangeTracker`]s, which hold the baseline content each change is
/// measured against.
///
/// Adding an element under a present key goes through the inner dataset's
/// `add`, so its duplicate policy applies. The inner dataset must update the
/// stored tracker in place (as [`MemoryDataset`] does) to keep its baseline.
#[derive(Debug, Clone)]
pub struct DiffDataset<E, D = MemoryDataset<ChangeTracker<E>>> {
    inner: D,
    added: BTreeSet<Key>,
    removed: BTreeMap<Key, E>,
    changed: BTreeSet<Key>,
}

impl<E: Element + Clone> DiffDataset<E> {
    /// Create an empty in-memory diff dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::wrap(MemoryDataset::new())
    }

    /// Build from initial (baseline) data. Nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns `Error::DuplicateKey` if two elements share a key.
    pub fn from_elements<I>(elements: I) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
    {
        let inner = MemoryDataset::from_elements(elements.into_iter().map(ChangeTracker::new))?;
        Ok(Self::wrap(inner))
    }
}

impl<E: Element + Clone> Default for DiffDataset<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element + Clone> From<MemoryDataset<E>> for DiffDataset<E> {
    fn from(dataset: MemoryDataset<E>) -> Self {
        Self::wrap(dataset.into_elements().map(ChangeTracker::new).collect())
    }
}

impl<E, D> DiffDataset<E, D>
where
    E: Element + Clone,
    D: Dataset<ChangeTracker<E>>,
{
    /// Wrap an existing dataset of tracked elements. The recording epoch
    /// starts empty.
    pub fn wrap(inner: D) -> Self {
        Self {
            inner,
            added: BTreeSet::new(),
            removed: BTreeMap::new(),
            changed: BTreeSet::new(),
        }
    }

    /// The wrapped dataset.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Unwrap, discarding the recorded diff.
    pub fn into_inner(self) -> D {
        self.inner
    }

    /// The tracker holding `key`, with its baseline.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key is absent.
    pub fn tracker(&self, key: &Key) -> Result<&ChangeTracker<E>> {
        self.inner.get(key)
    }

    /// Keys added in this epoch.
    #[must_use]
    pub fn added(&self) -> Vec<Key> {
        self.added.iter().cloned().collect()
    }

    /// Keys removed in this epoch.
    #[must_use]
    pub fn removed(&self) -> Vec<Key> {
        self.removed.keys().cloned().collect()
    }

    /// Keys whose content changed in this epoch.
    #[must_use]
    pub fn changed(&self) -> Vec<Key> {
        self.changed.iter().cloned().collect()
    }

    /// Baseline elements of the removed keys, in key order.
    pub fn removed_elements(&self) -> impl Iterator<Item = &E> {
        self.removed.values()
    }

    /// Current elements of the added keys, in key order.
    pub fn added_elements(&self) -> impl Iterator<Item = &E> {
        self.added
            .iter()
            .filter_map(|key| self.inner.get(key).ok().map(ChangeTracker::inner))
    }

    /// `(baseline, current)` content pairs of the changed keys, in key order.
    pub fn changed_elements(&self) -> impl Iterator<Item = (&Content, &E)> {
        self.changed.iter().filter_map(|key| {
            let tracker = self.inner.get(key).ok()?;
            Some((tracker.original()?, tracker.inner()))
        })
    }

    /// Snapshot of everything recorded in this epoch.
    #[must_use]
    pub fn diff(&self) -> Diff {
        Diff {
            added: self.added(),
            removed: self.removed(),
            changed: self.changed(),
        }
    }

    /// Record `key` as changed after an edit that bypassed `add`/`update`
    /// (for example through [`Dataset::get_mut`]).
    ///
    /// The key is recorded only if its content differs from the baseline.
    /// Returns whether the key is now recorded as changed.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the key is absent.
    pub fn register_change(&mut self, key: &Key) -> Result<bool> {
        self.inner.get(key)?;
        self.note_content_change(key);
        Ok(self.changed.contains(key))
    }

    /// Forget everything recorded and re-baseline all elements.
    ///
    /// The underlying data is untouched; a fresh epoch starts.
    pub fn reset(&mut self) {
        for key in self.inner.keys() {
            if let Ok(tracker) = self.inner.get_mut(&key) {
                tracker.reset();
            }
        }
        self.added.clear();
        self.removed.clear();
        self.changed.clear();
    }

    /// Undo the current epoch: drop added keys, restore removed elements and
    /// baseline content, then start a fresh epoch.
    ///
    /// # Errors
    ///
    /// Propagates errors from the inner dataset.
    pub fn revert(&mut self) -> Result<()> {
        for key in std::mem::take(&mut self.added) {
            self.inner.pop(&key)?;
        }
        for (_, element) in std::mem::take(&mut self.removed) {
            self.inner.add(ChangeTracker::new(element))?;
        }
        for key in self.inner.keys() {
            let tracker = self.inner.get_mut(&key)?;
            if tracker.is_changed() {
                if let Some(original) = tracker.original().cloned() {
                    tracker.update(original);
                }
            }
        }
        self.reset();
        Ok(())
    }

    fn note_content_change(&mut self, key: &Key) {
        if self.added.contains(key) {
            return;
        }
        match self.inner.get(key) {
            Ok(tracker) if tracker.is_changed() => {
                self.changed.insert(key.clone());
            }
            _ => {
                self.changed.remove(key);
            }
        }
    }
}

impl<E, D> Dataset<E> for DiffDataset<E, D>
where
    E: Element + Clone,
    D: Dataset<ChangeTracker<E>>,
{
    fn get(&self, key: &Key) -> Result<&E> {
        self.inner.get(key).map(ChangeTracker::inner)
    }

    fn get_mut(&mut self, key: &Key) -> Result<&mut E> {
        self.inner.get_mut(key).map(ChangeTracker::inner_mut)
    }

    fn add(&mut self, element: E) -> Result<Added> {
        let key = element.key().clone();

        if self.inner.contains(&key) {
            let outcome = self.inner.add(ChangeTracker::fresh(element))?;
            self.note_content_change(&key);
            return Ok(outcome);
        }

        let tracker = match self.removed.get(&key) {
            Some(baseline) => ChangeTracker::with_baseline(element, baseline.content().clone()),
            None => ChangeTracker::fresh(element),
        };
        self.inner.add(tracker)?;

        if self.removed.remove(&key).is_some() {
            self.note_content_change(&key);
        } else {
            self.added.insert(key);
        }
        Ok(Added::Inserted)
    }

    fn pop(&mut self, key: &Key) -> Result<E> {
        let tracker = self.inner.pop(key)?;
        if !self.added.remove(key) {
            self.changed.remove(key);
            let baseline = tracker
                .original_element()
                .unwrap_or_else(|| tracker.inner().clone());
            self.removed.insert(key.clone(), baseline);
        }
        Ok(tracker.into_inner())
    }

    fn update(&mut self, key: &Key, content: Content) -> Result<bool> {
        let differed = self.inner.update(key, content)?;
        self.note_content_change(key);
        Ok(differed)
    }

    fn contains(&self, key: &Key) -> bool {
        self.inner.contains(key)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &E> + '_> {
        Box::new(self.inner.iter().map(ChangeTracker::inner))
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn keys(&self) -> Vec<Key> {
        self.inner.keys()
    }

    /// Empty the dataset and forget the recorded diff.
    fn clear(&mut self) {
        self.inner.clear();
        self.added.clear();
        self.removed.clear();
        self.changed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::Record;

    fn content(v: i64) -> Content {
        Record::bare(0).with("v", v).content().clone()
    }

    fn baseline() -> DiffDataset<Record> {
        DiffDataset::from_elements([
            Record::bare("k1").with("v", 0),
            Record::bare("k3").with("v", 9),
        ])
        .unwrap()
    }

    #[test]
    fn test_initial_data_is_not_recorded() {
        let ds = baseline();
        assert_eq!(ds.len(), 2);
        assert!(ds.diff().is_empty());
    }

    #[test]
    fn test_records_add_change_remove() {
        let mut ds = baseline();

        ds.add(Record::bare("k2").with("v", 2)).unwrap();
        ds.add(Record::bare("k1").with("v", 1)).unwrap();
        ds.pop(&Key::from("k3")).unwrap();

        let diff = ds.diff();
        assert_eq!(diff.added, vec![Key::from("k2")]);
        assert_eq!(diff.changed, vec![Key::from("k1")]);
        assert_eq!(diff.removed, vec![Key::from("k3")]);
        assert_eq!(diff.total(), 3);
    }

    #[test]
    fn test_strict_inner_rejects_duplicate_add() {
        let mut inner = MemoryDataset::strict();
        inner.add(ChangeTracker::new(Record::bare("k1").with("v", 0))).unwrap();
        let mut ds: DiffDataset<Record> = DiffDataset::wrap(inner);

        let err = ds.add(Record::bare("k1").with("v", 1)).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
        assert!(ds.diff().is_empty());
        assert_eq!(ds.get(&Key::from("k1")).unwrap().property("v"), Some(&serde_json::json!(0)));

        // Updates by key are not adds and stay allowed.
        assert!(ds.update(&Key::from("k1"), content(1)).unwrap());
        assert_eq!(ds.diff().changed, vec![Key::from("k1")]);
    }

    #[test]
    fn test_noop_update_is_not_reported() {
        let mut ds = baseline();
        assert_eq!(ds.add(Record::bare("k1").with("v", 0)).unwrap(), Added::Unchanged);
        assert!(!ds.update(&Key::from("k1"), content(0)).unwrap());
        assert!(ds.diff().is_empty());
    }

    #[test]
    fn test_add_then_pop_cancels_out() {
        let mut ds = baseline();
        ds.add(Record::bare("new")).unwrap();
        ds.pop(&Key::from("new")).unwrap();
        assert!(ds.diff().is_empty());
    }

    #[test]
    fn test_pop_then_readd_same_content_cancels_out() {
        let mut ds = baseline();
        ds.pop(&Key::from("k1")).unwrap();
        assert_eq!(ds.removed(), vec![Key::from("k1")]);

        ds.add(Record::bare("k1").with("v", 0)).unwrap();
        assert!(ds.diff().is_empty());
    }

    #[test]
    fn test_pop_then_readd_different_content_is_changed() {
        let mut ds = baseline();
        ds.pop(&Key::from("k1")).unwrap();
        ds.add(Record::bare("k1").with("v", 5)).unwrap();

        let diff = ds.diff();
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
        assert_eq!(diff.changed, vec![Key::from("k1")]);
    }

    #[test]
    fn test_changed_then_removed_reports_baseline() {
        let mut ds = baseline();
        ds.update(&Key::from("k1"), content(42)).unwrap();
        ds.pop(&Key::from("k1")).unwrap();

        assert!(ds.changed().is_empty());
        let removed: Vec<&Record> = ds.removed_elements().collect();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].property("v"), Some(&serde_json::json!(0)));
    }

    #[test]
    fn test_restoring_baseline_clears_change() {
        let mut ds = baseline();
        ds.update(&Key::from("k1"), content(7)).unwrap();
        assert_eq!(ds.changed(), vec![Key::from("k1")]);

        ds.update(&Key::from("k1"), content(0)).unwrap();
        assert!(ds.changed().is_empty());
    }

    #[test]
    fn test_added_key_edits_stay_added() {
        let mut ds = baseline();
        ds.add(Record::bare("k2").with("v", 1)).unwrap();
        ds.add(Record::bare("k2").with("v", 2)).unwrap();

        let diff = ds.diff();
        assert_eq!(diff.added, vec![Key::from("k2")]);
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_register_change_after_direct_edit() {
        let mut ds = baseline();
        ds.get_mut(&Key::from("k3")).unwrap().update(content(10));
        assert!(ds.changed().is_empty());

        assert!(ds.register_change(&Key::from("k3")).unwrap());
        assert_eq!(ds.changed(), vec![Key::from("k3")]);

        let pairs: Vec<_> = ds.changed_elements().collect();
        assert_eq!(pairs[0].0["v"], serde_json::json!(9));
        assert_eq!(pairs[0].1.property("v"), Some(&serde_json::json!(10)));

        assert!(matches!(
            ds.register_change(&Key::from("missing")),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_reset_starts_fresh_epoch() {
        let mut ds = baseline();
        ds.add(Record::bare("k2")).unwrap();
        ds.update(&Key::from("k1"), content(1)).unwrap();
        ds.reset();
        assert!(ds.diff().is_empty());
        assert_eq!(ds.len(), 3);

        // After reset, popping a previously added key is a removal.
        ds.pop(&Key::from("k2")).unwrap();
        assert_eq!(ds.removed(), vec![Key::from("k2")]);
        assert!(ds.tracker(&Key::from("k1")).unwrap().original().is_some());
    }

    #[test]
    fn test_revert_restores_baseline() {
        let mut ds = baseline();
        ds.add(Record::bare("k2").with("v", 2)).unwrap();
        ds.update(&Key::from("k1"), content(1)).unwrap();
        ds.pop(&Key::from("k3")).unwrap();

        ds.revert().unwrap();

        assert!(ds.diff().is_empty());
        assert_eq!(ds.keys(), vec![Key::from("k1"), Key::from("k3")]);
        assert_eq!(
            ds.get(&Key::from("k1")).unwrap().property("v"),
            Some(&serde_json::json!(0))
        );
        assert_eq!(
            ds.get(&Key::from("k3")).unwrap().property("v"),
            Some(&serde_json::json!(9))
        );
    }

    #[test]
    fn test_added_and_removed_never_overlap() {
        let mut ds = baseline();
        for round in 0..3 {
            ds.add(Record::bare("k1").with("v", round)).unwrap();
            ds.pop(&Key::from("k1")).unwrap();
            ds.add(Record::bare("x").with("v", round)).unwrap();
            ds.pop(&Key::from("x")).unwrap();
            ds.add(Record::bare("k1").with("v", round + 1)).unwrap();
        }
        let diff = ds.diff();
        assert!(diff.added.iter().all(|k| !diff.removed.contains(k)));
        assert_eq!(diff.changed, vec![Key::from("k1")]);
    }
}
