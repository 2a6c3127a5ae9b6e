//! Element model for importsync.
//!
//! This module contains the identity/content model:
//! - Key (natural key tuple of scalars)
//! - Record (the default element)
//! - ChangeTracker (baseline-aware decorator)

pub mod key;
pub mod record;
pub mod tracker;

pub use key::{Key, Scalar};
pub use record::{Content, Element, Record};
pub use tracker::{ChangeTracker, TrackState};
