//! Reconciliation strategies.
//!
//! A strategy borrows the source read-only and the destination exclusively,
//! and makes the destination converge toward the source:
//!
//! 1. [`insert_missing`]: keys only in the source are inserted.
//! 2. [`update_existing`]: keys on both sides get the source content.
//! 3. [`remove_stale`]: keys only in the destination are removed.
//!
//! Phases always run in that order. Full sync runs all three; additive sync
//! never runs the third. Errors from either dataset are not caught: a failed
//! phase leaves the destination as the last completed step left it.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::model::{Element, Key};

/// Which reconciler to apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Destination becomes an exact mirror of the source.
    #[default]
    Full,
    /// Insert and update only; nothing is ever removed.
    Additive,
}

impl Strategy {
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Full => "full",
            Self::Additive => "additive",
        }
    }

    /// Run this strategy over `source` and `destination`.
    ///
    /// # Errors
    ///
    /// Propagates the first dataset error.
    pub fn apply<E, S, D>(self, source: &S, destination: &mut D) -> Result<()>
    where
        E: Element + Clone,
        S: Dataset<E> + ?Sized,
        D: Dataset<E> + ?Sized,
    {
        match self {
            Self::Full => full_sync(source, destination),
            Self::Additive => additive_sync(source, destination),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Make `destination` set-equal and content-equal to `source`.
///
/// # Errors
///
/// Propagates the first dataset error.
pub fn full_sync<E, S, D>(source: &S, destination: &mut D) -> Result<()>
where
    E: Element + Clone,
    S: Dataset<E> + ?Sized,
    D: Dataset<E> + ?Sized,
{
    let inserted = insert_missing(source, destination)?;
    let updated = update_existing(source, destination)?;
    let removed = remove_stale(source, destination)?;
    debug!(inserted, updated, removed, "Full sync complete");
    Ok(())
}

/// Insert missing and update differing elements; never remove.
///
/// # Errors
///
/// Propagates the first dataset error.
pub fn additive_sync<E, S, D>(source: &S, destination: &mut D) -> Result<()>
where
    E: Element + Clone,
    S: Dataset<E> + ?Sized,
    D: Dataset<E> + ?Sized,
{
    let inserted = insert_missing(source, destination)?;
    let updated = update_existing(source, destination)?;
    debug!(inserted, updated, "Additive sync complete");
    Ok(())
}

/// Insert every source element whose key is absent from `destination`.
///
/// Returns the number of inserted elements.
///
/// # Errors
///
/// Propagates errors from `destination.add`.
pub fn insert_missing<E, S, D>(source: &S, destination: &mut D) -> Result<usize>
where
    E: Element + Clone,
    S: Dataset<E> + ?Sized,
    D: Dataset<E> + ?Sized,
{
    let mut inserted = 0;
    for element in source.iter() {
        if !destination.contains(element.key()) {
            trace!(key = %element.key(), "insert");
            destination.add(element.clone())?;
            inserted += 1;
        }
    }
    Ok(inserted)
}

/// Copy source content onto every destination element with the same key
/// whose content differs. Equal content is left alone.
///
/// Returns the number of updated elements.
///
/// # Errors
///
/// Propagates errors from `destination.get` and `destination.update`.
pub fn update_existing<E, S, D>(source: &S, destination: &mut D) -> Result<usize>
where
    E: Element + Clone,
    S: Dataset<E> + ?Sized,
    D: Dataset<E> + ?Sized,
{
    let mut updated = 0;
    for element in source.iter() {
        let key = element.key();
        if !destination.contains(key) {
            continue;
        }
        let existing = destination.get(key)?;
        if existing.content() == element.content() {
            continue;
        }
        trace!(key = %key, "update");
        if destination.update(key, element.content().clone())? {
            updated += 1;
        }
    }
    Ok(updated)
}

/// Remove every destination element whose key is absent from `source`.
///
/// Only the keys of stale elements are read; the removed elements are dropped.
///
/// Returns the number of removed elements.
///
/// # Errors
///
/// Propagates errors from `destination.pop`.
pub fn remove_stale<E, S, D>(source: &S, destination: &mut D) -> Result<usize>
where
    E: Element,
    S: Dataset<E> + ?Sized,
    D: Dataset<E> + ?Sized,
{
    let stale: Vec<Key> = destination
        .keys()
        .into_iter()
        .filter(|key| !source.contains(key))
        .collect();
    for key in &stale {
        trace!(key = %key, "remove");
        destination.pop(key)?;
    }
    Ok(stale.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Added, DiffDataset, MemoryDataset};
    use crate::error::Error;
    use crate::model::Record;

    /// Holds its elements but fails every read by key.
    struct Unreadable(MemoryDataset<Record>);

    impl Dataset<Record> for Unreadable {
        fn get(&self, _key: &Key) -> Result<&Record> {
            Err(Error::Other("read failed".into()))
        }
        fn get_mut(&mut self, key: &Key) -> Result<&mut Record> {
            self.0.get_mut(key)
        }
        fn add(&mut self, element: Record) -> Result<Added> {
            self.0.add(element)
        }
        fn pop(&mut self, key: &Key) -> Result<Record> {
            self.0.pop(key)
        }
        fn contains(&self, key: &Key) -> bool {
            self.0.contains(key)
        }
        fn iter(&self) -> Box<dyn Iterator<Item = &Record> + '_> {
            self.0.iter()
        }
        fn len(&self) -> usize {
            self.0.len()
        }
        fn clear(&mut self) {
            self.0.clear();
        }
    }

    fn source() -> MemoryDataset<Record> {
        MemoryDataset::from_elements([
            Record::bare("k1").with("v", 1),
            Record::bare("k2").with("v", 2),
        ])
        .unwrap()
    }

    fn destination() -> DiffDataset<Record> {
        DiffDataset::from_elements([
            Record::bare("k1").with("v", 0),
            Record::bare("k3").with("v", 9),
        ])
        .unwrap()
    }

    fn v(ds: &impl Dataset<Record>, key: &str) -> serde_json::Value {
        ds.get(&Key::from(key)).unwrap().property("v").cloned().unwrap()
    }

    #[test]
    fn test_full_sync_scenario() {
        let src = source();
        let mut dst = destination();

        full_sync(&src, &mut dst).unwrap();

        assert_eq!(dst.keys(), vec![Key::from("k1"), Key::from("k2")]);
        assert_eq!(v(&dst, "k1"), serde_json::json!(1));
        assert_eq!(v(&dst, "k2"), serde_json::json!(2));

        let diff = dst.diff();
        assert_eq!(diff.added, vec![Key::from("k2")]);
        assert_eq!(diff.removed, vec![Key::from("k3")]);
        assert_eq!(diff.changed, vec![Key::from("k1")]);
    }

    #[test]
    fn test_additive_sync_scenario() {
        let src = source();
        let mut dst = destination();

        additive_sync(&src, &mut dst).unwrap();

        assert_eq!(
            dst.keys(),
            vec![Key::from("k1"), Key::from("k2"), Key::from("k3")]
        );
        assert_eq!(v(&dst, "k1"), serde_json::json!(1));
        assert_eq!(v(&dst, "k3"), serde_json::json!(9));

        let diff = dst.diff();
        assert_eq!(diff.added, vec![Key::from("k2")]);
        assert!(diff.removed.is_empty());
        assert_eq!(diff.changed, vec![Key::from("k1")]);
    }

    #[test]
    fn test_full_sync_is_idempotent() {
        let src = source();
        let mut dst = destination();

        full_sync(&src, &mut dst).unwrap();
        dst.reset();
        full_sync(&src, &mut dst).unwrap();

        assert!(dst.diff().is_empty());
    }

    #[test]
    fn test_phase_counts() {
        let src = source();
        let mut dst: MemoryDataset<Record> = [
            Record::bare("k1").with("v", 0),
            Record::bare("k3").with("v", 9),
        ]
        .into_iter()
        .collect();

        assert_eq!(insert_missing(&src, &mut dst).unwrap(), 1);
        assert_eq!(update_existing(&src, &mut dst).unwrap(), 1);
        assert_eq!(update_existing(&src, &mut dst).unwrap(), 0);
        assert_eq!(remove_stale(&src, &mut dst).unwrap(), 1);
        assert_eq!(remove_stale(&src, &mut dst).unwrap(), 0);
    }

    #[test]
    fn test_empty_source_full_sync_clears_destination() {
        let src: MemoryDataset<Record> = MemoryDataset::new();
        let mut dst = destination();

        Strategy::Full.apply(&src, &mut dst).unwrap();
        assert!(dst.is_empty());
        assert_eq!(dst.removed().len(), 2);

        let mut dst = destination();
        Strategy::Additive.apply(&src, &mut dst).unwrap();
        assert_eq!(dst.len(), 2);
        assert!(dst.diff().is_empty());
    }

    #[test]
    fn test_source_is_untouched() {
        let src = source();
        let mut dst = destination();
        full_sync(&src, &mut dst).unwrap();
        assert_eq!(src.len(), 2);
        assert_eq!(v(&src, "k1"), serde_json::json!(1));
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(serde_json::to_string(&Strategy::Additive).unwrap(), "\"additive\"");
        let parsed: Strategy = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(parsed, Strategy::Full);
        assert_eq!(Strategy::default().to_string(), "full");
    }

    #[test]
    fn test_read_error_is_not_mistaken_for_absent_key() {
        let src = source();
        let mut dst = Unreadable(
            MemoryDataset::from_elements([Record::bare("k1").with("v", 0)]).unwrap(),
        );

        let err = update_existing(&src, &mut dst).unwrap_err();
        assert!(matches!(err, Error::Other(ref m) if m == "read failed"));
        assert!(full_sync(&src, &mut dst).is_err());
    }
}
