//! Raw record sources.
//!
//! Every built-in source yields [`RawRecord`]s: a named set of JSON values
//! plus the position it was read from. A [`FieldMapping`](super::FieldMapping)
//! turns them into elements.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::sync::JsonlReader;

/// One raw record, before it becomes an element.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-based line (or group) number in the input.
    pub line: usize,
    pub fields: Map<String, Value>,
}

impl RawRecord {
    #[must_use]
    pub fn new(line: usize, fields: Map<String, Value>) -> Self {
        Self { line, fields }
    }
}

impl fmt::Display for RawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at line {}: {}", self.line, Value::Object(self.fields.clone()))
    }
}

// ── Args ──────────────────────────────────────────────────────

/// Groups a flat list of values into fixed-size records.
///
/// With names `["state", "code"]`, the values `["S1", "C1", "S2", "C2"]`
/// yield `{"state":"S1","code":"C1"}` and `{"state":"S2","code":"C2"}`.
/// Handy for building a dataset from command-line arguments.
#[derive(Debug, Clone)]
pub struct ArgsSource {
    names: Vec<String>,
    values: Vec<String>,
}

impl ArgsSource {
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `names` is empty or the number of
    /// values is not a multiple of the number of names.
    pub fn new<N, V>(names: N, values: V) -> Result<Self>
    where
        N: IntoIterator,
        N::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::InvalidArgument(
                "argument groups need at least one name".to_string(),
            ));
        }
        if values.len() % names.len() != 0 {
            return Err(Error::InvalidArgument(format!(
                "{} values cannot be grouped by {}",
                values.len(),
                names.len()
            )));
        }
        Ok(Self { names, values })
    }

    /// Number of records this source yields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() / self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for ArgsSource {
    type Item = Result<RawRecord>;
    type IntoIter = std::vec::IntoIter<Result<RawRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        let records: Vec<Result<RawRecord>> = self
            .values
            .chunks(self.names.len())
            .enumerate()
            .map(|(i, group)| {
                let fields = self
                    .names
                    .iter()
                    .zip(group)
                    .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                    .collect();
                Ok(RawRecord::new(i + 1, fields))
            })
            .collect();
        records.into_iter()
    }
}

// ── JSONL ─────────────────────────────────────────────────────

/// Streams JSON objects from a JSONL file, one record per line.
pub struct JsonlSource {
    reader: JsonlReader<BufReader<File>, Map<String, Value>>,
}

impl JsonlSource {
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            reader: JsonlReader::open(path)?,
        })
    }
}

impl Iterator for JsonlSource {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader
            .next()
            .map(|item| item.map(|(line, fields)| RawRecord::new(line, fields)))
    }
}
