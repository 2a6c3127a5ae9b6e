//! Configuration management.
//!
//! This module resolves and loads the importsync configuration file.
//!
//! # Architecture
//!
//! Configuration is a single JSON file holding defaults for `sync` runs:
//! - **Loader**: chunk size, reconciliation strategy, sorted/unsorted inputs
//! - **Mapping**: key and content fields
//! - **CSV**: header handling and value typing
//!
//! Command-line flags always override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::loader::DEFAULT_CHUNK_SIZE;
use crate::sync::Strategy;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "IMPORTSYNC_CONFIG";

/// Defaults for `sync` runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    /// Merged elements per chunk.
    pub chunk_size: usize,
    pub strategy: Strategy,
    /// Fields forming the natural key, in order.
    pub key_fields: Vec<String>,
    /// Content fields; empty means every non-key field.
    pub content_fields: Vec<String>,
    /// Whether CSV inputs start with a header row.
    pub has_header: bool,
    /// Read CSV integers as numbers and empty cells as null.
    pub typed_csv: bool,
    /// Rows per query when streaming a SQLite destination.
    pub buffer_size: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: Strategy::Full,
            key_fields: Vec::new(),
            content_fields: Vec::new(),
            has_header: true,
            typed_csv: false,
            buffer_size: 1000,
        }
    }
}

impl ImportConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed, or holds
    /// invalid values.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve and load the configuration, falling back to defaults when no
    /// file exists.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if an explicitly named file is missing or any
    /// resolved file is invalid.
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        match resolve_config_path(explicit_path) {
            Some(path) if path.exists() => Self::load(&path),
            Some(path) if explicit_path.is_some() || env_config_path().is_some() => Err(
                Error::Config(format!("config file {} does not exist", path.display())),
            ),
            _ => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// Returns `Error::Config` if a size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Get the global importsync directory location (`~/.importsync/`).
#[must_use]
pub fn global_importsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".importsync"))
}

fn env_config_path() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

/// Resolve the config file path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `IMPORTSYNC_CONFIG` environment variable
/// 3. Global location: `~/.importsync/config.json`
#[must_use]
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }
    env_config_path().or_else(|| global_importsync_dir().map(|dir| dir.join("config.json")))
}
