//! Atomic file operations and JSONL streaming.
//!
//! This module provides safe file operations that prevent data corruption:
//! - Atomic JSONL writes: stream to a temp file, sync to disk, then rename
//! - Streaming JSONL reads that never hold the whole file in memory

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Temp file path next to `path`, creating the parent directory if needed.
fn create_temp(path: &Path) -> Result<PathBuf> {
    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");

    // Ensure parent directory exists
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(path.with_file_name(temp_name))
}

/// JSONL file written record by record, replacing its target atomically.
///
/// Records go to `<name>.tmp` next to the target. [`commit`](Self::commit)
/// syncs and renames it over the target; dropping the writer without
/// committing removes the temp file and leaves the target untouched. The
/// target may be a file that is still being read.
#[derive(Debug)]
pub struct JsonlWriter {
    path: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl JsonlWriter {
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        let temp_path = create_temp(path)?;
        let file = File::create(&temp_path)?;
        Ok(Self {
            path: path.to_path_buf(),
            temp_path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    /// Append records, one per line.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be serialized or written.
    pub fn write_all<T: Serialize>(&mut self, records: impl IntoIterator<Item = T>) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(Error::Other("JSONL writer already closed".to_string()));
        };
        for record in records {
            serde_json::to_writer(&mut *writer, &record)?;
            writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(())
    }

    /// Records written so far.
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Sync the temp file and move it over the target.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing, syncing or renaming fails. The temp file
    /// is removed in that case.
    pub fn commit(mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(Error::Other("JSONL writer already closed".to_string()));
        };
        let result = finish(writer, &self.temp_path, &self.path);
        if result.is_err() {
            fs::remove_file(&self.temp_path).ok();
        }
        result
    }
}

fn finish(writer: BufWriter<File>, temp_path: &Path, path: &Path) -> Result<()> {
    let file = writer
        .into_inner()
        .map_err(std::io::IntoInnerError::into_error)?;
    // Sync to disk before rename
    file.sync_all()?;
    fs::rename(temp_path, path)?;
    Ok(())
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            fs::remove_file(&self.temp_path).ok();
        }
    }
}

/// Write records to a JSONL file atomically.
///
/// # Errors
///
/// Returns an error if a record cannot be serialized or the file cannot be
/// written.
pub fn write_jsonl<T: Serialize>(path: &Path, records: impl IntoIterator<Item = T>) -> Result<()> {
    let mut writer = JsonlWriter::create(path)?;
    writer.write_all(records)?;
    writer.commit()
}

/// Streaming JSONL reader.
///
/// Yields `(line_number, record)` pairs, 1-based. Blank lines are skipped.
/// A line that does not parse as `T` yields `Error::InvalidRecord` carrying
/// its line number.
pub struct JsonlReader<R, T> {
    lines: Lines<R>,
    line: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonlReader<BufReader<File>, T> {
    /// Open a JSONL file for streaming.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead, T: DeserializeOwned> JsonlReader<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            _record: PhantomData,
        }
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonlReader<R, T> {
    type Item = Result<(usize, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(e) => return Some(Err(e.into())),
            };
            self.line += 1;
            if text.trim().is_empty() {
                continue;
            }
            let line = self.line;
            return Some(
                serde_json::from_str(&text)
                    .map(|record| (line, record))
                    .map_err(|e| Error::InvalidRecord {
                        line,
                        message: e.to_string(),
                    }),
            );
        }
    }
}

/// Read all records from a JSONL file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or any line is invalid.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    JsonlReader::open(path)?
        .map(|item| item.map(|(_, record)| record))
        .collect()
}
