//! importsync - reconcile importable datasets
//!
//! This crate provides the core functionality for the `importsync` CLI tool:
//! bringing a destination dataset in line with a source dataset, keyed by a
//! natural key, either in one pass or chunk by chunk over sorted streams.
//!
//! # Architecture
//!
//! - [`model`] - Keys, elements and change tracking
//! - [`dataset`] - Keyed collections and the diff-recording dataset
//! - [`sync`] - Full and additive reconciliation, JSONL helpers
//! - [`loader`] - Record sources, field mapping and the chunked loader
//! - [`storage`] - SQLite destination tables
//! - [`config`] - Configuration management
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};

/// Global dry-run flag for `--dry-run`.
///
/// When set, `sync` reconciles and reports without writing the destination.
pub static DRY_RUN: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if dry-run mode is active.
#[inline]
pub fn is_dry_run() -> bool {
    DRY_RUN.load(std::sync::atomic::Ordering::Relaxed)
}
