//! Change tracking for elements.
//!
//! A [`ChangeTracker`] wraps an element and remembers the content it had when
//! it was wrapped (or last re-baselined), so it can classify the element as
//! new, unchanged or changed. It does not alter the element's identity.

use super::key::Key;
use super::record::{Content, Element};

/// Classification of a tracked element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Wrapped without a baseline: never seen before.
    New,
    /// Content equals the baseline.
    Unchanged,
    /// Content differs from the baseline.
    Changed,
}

/// Decorator over an [`Element`] remembering its original content.
#[derive(Debug, Clone)]
pub struct ChangeTracker<E> {
    element: E,
    original: Option<Content>,
}

impl<E: Element> ChangeTracker<E> {
    /// Track an existing element, taking its current content as the baseline.
    pub fn new(element: E) -> Self {
        let original = Some(element.content().clone());
        Self { element, original }
    }

    /// Track an element that has no prior snapshot.
    pub fn fresh(element: E) -> Self {
        Self {
            element,
            original: None,
        }
    }

    /// Track an element against an explicit baseline.
    pub fn with_baseline(element: E, original: Content) -> Self {
        Self {
            element,
            original: Some(original),
        }
    }

    /// The baseline content, `None` for new elements.
    #[must_use]
    pub fn original(&self) -> Option<&Content> {
        self.original.as_ref()
    }

    /// True if the tracker was created with no prior snapshot.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.original.is_none()
    }

    /// True if current content differs from the baseline.
    ///
    /// New elements have nothing to differ from and report `false`.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.original
            .as_ref()
            .is_some_and(|orig| orig != self.element.content())
    }

    #[must_use]
    pub fn state(&self) -> TrackState {
        if self.is_new() {
            TrackState::New
        } else if self.is_changed() {
            TrackState::Changed
        } else {
            TrackState::Unchanged
        }
    }

    /// Re-baseline to the current content, clearing change state.
    pub fn reset(&mut self) {
        self.original = Some(self.element.content().clone());
    }

    /// The tracked element.
    #[must_use]
    pub fn inner(&self) -> &E {
        &self.element
    }

    /// Mutable access that bypasses tracking; compare with [`Self::is_changed`]
    /// afterwards to classify the edit.
    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.element
    }

    /// Unwrap the tracked element, dropping the baseline.
    pub fn into_inner(self) -> E {
        self.element
    }

    /// Split into the element and its baseline.
    pub fn into_parts(self) -> (E, Option<Content>) {
        (self.element, self.original)
    }
}

impl<E: Element + Clone> ChangeTracker<E> {
    /// The element as it was at the baseline, `None` for new elements.
    #[must_use]
    pub fn original_element(&self) -> Option<E> {
        self.original.as_ref().map(|orig| {
            let mut element = self.element.clone();
            element.update(orig.clone());
            element
        })
    }
}

impl<E: Element> Element for ChangeTracker<E> {
    fn key(&self) -> &Key {
        self.element.key()
    }

    fn content(&self) -> &Content {
        self.element.content()
    }

    fn update(&mut self, content: Content) -> bool {
        self.element.update(content)
    }
}
