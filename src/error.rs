//! Error types for importsync.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=not_found, 3=build, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

use crate::model::Key;

/// Result type alias for importsync operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Not Found (exit 2)
    KeyNotFound,

    // Records (exit 3)
    BuildFailed,
    InvalidRecord,

    // Validation (exit 4)
    DuplicateKey,
    UnorderedStream,
    InvalidArgument,

    // Database (exit 5)
    DatabaseError,

    // Config (exit 6)
    ConfigError,

    // I/O (exit 7)
    IoError,
    JsonError,
    CsvError,

    // Internal (exit 1)
    Cancelled,
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::BuildFailed => "BUILD_FAILED",
            Self::InvalidRecord => "INVALID_RECORD",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::UnorderedStream => "UNORDERED_STREAM",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::CsvError => "CSV_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-7).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Cancelled | Self::InternalError => 1,
            Self::KeyNotFound => 2,
            Self::BuildFailed | Self::InvalidRecord => 3,
            Self::DuplicateKey | Self::UnorderedStream | Self::InvalidArgument => 4,
            Self::DatabaseError => 5,
            Self::ConfigError => 6,
            Self::IoError | Self::JsonError | Self::CsvError => 7,
        }
    }

    /// Whether re-running with corrected input can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BuildFailed
                | Self::InvalidRecord
                | Self::DuplicateKey
                | Self::UnorderedStream
                | Self::InvalidArgument
                | Self::DatabaseError
                | Self::Cancelled
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur while loading, diffing or reconciling datasets.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Key not found: {key}")]
    NotFound { key: Key },

    #[error("Cannot build element from record {record}: {reason}")]
    Build { record: String, reason: String },

    #[error("Duplicate key: {key}")]
    DuplicateKey { key: Key },

    #[error("{stream} stream is not sorted by key: {key} follows {previous}")]
    UnorderedStream {
        stream: String,
        previous: Key,
        key: Key,
    },

    #[error("Invalid record at line {line}: {message}")]
    InvalidRecord {
        /// Line number (1-indexed).
        line: usize,
        message: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Load cancelled after {chunks} chunk(s)")]
    Cancelled { chunks: usize },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build error for a raw record that a builder rejected.
    pub fn build(record: impl std::fmt::Debug, reason: impl Into<String>) -> Self {
        Self::Build {
            record: format!("{record:?}"),
            reason: reason.into(),
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::KeyNotFound,
            Self::Build { .. } => ErrorCode::BuildFailed,
            Self::InvalidRecord { .. } => ErrorCode::InvalidRecord,
            Self::DuplicateKey { .. } => ErrorCode::DuplicateKey,
            Self::UnorderedStream { .. } => ErrorCode::UnorderedStream,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Csv(_) => ErrorCode::CsvError,
            Self::Cancelled { .. } => ErrorCode::Cancelled,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::UnorderedStream { stream, .. } => Some(format!(
                "Chunked loading needs both inputs sorted by key. \
                 Sort the {stream} input, or pass `--unsorted` to load it in a single pass."
            )),
            Self::DuplicateKey { key } => Some(format!(
                "Each key may appear once per input. Remove the repeated record for {key}."
            )),
            Self::Build { .. } => Some(
                "Check that every record carries the `--key` fields with scalar values."
                    .to_string(),
            ),
            Self::InvalidArgument(msg) if msg.contains("chunk") => {
                Some("Use a chunk size of at least 1.".to_string())
            }
            Self::Config(_) => Some(
                "Check the file given by --config or IMPORTSYNC_CONFIG, \
                 or remove ~/.importsync/config.json to use defaults."
                    .to_string(),
            ),
            Self::NotFound { .. }
            | Self::InvalidRecord { .. }
            | Self::InvalidArgument(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Csv(_)
            | Self::Cancelled { .. }
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scalar;

    #[test]
    fn test_not_found_message_names_key() {
        let err = Error::NotFound {
            key: Key::from(vec![Scalar::from("k1")]),
        };
        assert_eq!(err.to_string(), "Key not found: (\"k1\")");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_structured_json_includes_hint() {
        let err = Error::UnorderedStream {
            stream: "source".into(),
            previous: Key::from(vec![Scalar::Int(2)]),
            key: Key::from(vec![Scalar::Int(1)]),
        };
        let json = err.to_structured_json();
        assert_eq!(json["error"]["code"], "UNORDERED_STREAM");
        assert_eq!(json["error"]["retryable"], true);
        assert!(json["error"]["hint"].as_str().unwrap().contains("--unsorted"));
    }

    #[test]
    fn test_build_error_carries_record() {
        let err = Error::build(("a", 1), "missing key field `id`");
        assert!(err.to_string().contains("(\"a\", 1)"));
        assert_eq!(err.error_code(), ErrorCode::BuildFailed);
    }
}
