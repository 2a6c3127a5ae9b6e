//! SQLite storage layer for importsync.
//!
//! This module provides a persistent dataset backend using SQLite with:
//! - WAL mode so a streaming reader and a writer can share a file
//! - Keyset-paginated buffered reads in key order
//! - One IMMEDIATE transaction per applied diff
//!
//! # Submodules
//!
//! - [`schema`] - Table layout and pragmas
//! - [`sqlite`] - Storage, diff application and buffered reads

pub mod schema;
pub mod sqlite;

pub use schema::{SYNCED_AT_COLUMN, TableSpec};
pub use sqlite::{ApplyStats, BufferedRows, SqliteStorage};
