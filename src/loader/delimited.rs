//! CSV record source.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde_json::{Map, Value};

use super::source::RawRecord;
use crate::error::{Error, Result};

/// A column selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    /// 0-based position.
    Index(usize),
    /// Header name; needs a header row.
    Name(String),
}

impl From<usize> for Column {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// How to read a CSV input.
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// Treat the first row as a header. Header names become field names;
    /// without a header, fields are named by their 0-based index.
    pub has_header: bool,
    /// Columns to keep. Empty keeps every column.
    pub columns: Vec<Column>,
    pub delimiter: u8,
    /// Read integers as numbers and empty cells as null instead of text.
    pub typed: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            has_header: true,
            columns: Vec::new(),
            delimiter: b',',
            typed: false,
        }
    }
}

/// Streams rows of a CSV input as [`RawRecord`]s.
pub struct CsvSource<R> {
    records: csv::StringRecordsIntoIter<R>,
    /// `(position, field name)` of every kept column.
    selected: Vec<(usize, String)>,
    typed: bool,
}

impl CsvSource<File> {
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or its header read.
    pub fn open(path: &Path, options: &CsvOptions) -> Result<Self> {
        Self::from_reader(File::open(path)?, options)
    }
}

impl<R: Read> CsvSource<R> {
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if a column is selected by name
    /// without a header, or the name is not in the header.
    pub fn from_reader(reader: R, options: &CsvOptions) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter)
            .has_headers(options.has_header)
            .flexible(true)
            .from_reader(reader);

        let headers: Option<Vec<String>> = if options.has_header {
            Some(reader.headers()?.iter().map(str::to_string).collect())
        } else {
            None
        };

        let selected = select_columns(headers.as_deref(), &options.columns)?;
        Ok(Self {
            records: reader.into_records(),
            selected,
            typed: options.typed,
        })
    }
}

fn select_columns(headers: Option<&[String]>, columns: &[Column]) -> Result<Vec<(usize, String)>> {
    if columns.is_empty() {
        return Ok(match headers {
            Some(headers) => headers.iter().cloned().enumerate().collect(),
            // Width unknown until the first row; resolved lazily.
            None => Vec::new(),
        });
    }

    columns
        .iter()
        .map(|column| match (column, headers) {
            (Column::Index(i), Some(headers)) => {
                let name = headers.get(*i).cloned().unwrap_or_else(|| i.to_string());
                Ok((*i, name))
            }
            (Column::Index(i), None) => Ok((*i, i.to_string())),
            (Column::Name(name), Some(headers)) => headers
                .iter()
                .position(|h| h == name)
                .map(|i| (i, name.clone()))
                .ok_or_else(|| Error::InvalidArgument(format!("no CSV column named `{name}`"))),
            (Column::Name(name), None) => Err(Error::InvalidArgument(format!(
                "column `{name}` selected by name, but the CSV has no header"
            ))),
        })
        .collect()
}

fn parse_field(text: &str, typed: bool) -> Value {
    if typed {
        if text.is_empty() {
            return Value::Null;
        }
        if let Ok(n) = text.parse::<i64>() {
            return Value::from(n);
        }
    }
    Value::String(text.to_string())
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.records.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e.into())),
        };
        let line = row
            .position()
            .map_or(0, |p| usize::try_from(p.line()).unwrap_or(usize::MAX));

        let mut fields = Map::new();
        if self.selected.is_empty() {
            for (i, text) in row.iter().enumerate() {
                fields.insert(i.to_string(), parse_field(text, self.typed));
            }
        } else {
            for (i, name) in &self.selected {
                let Some(text) = row.get(*i) else {
                    return Some(Err(Error::InvalidRecord {
                        line,
                        message: format!("row has no column {i}"),
                    }));
                };
                fields.insert(name.clone(), parse_field(text, self.typed));
            }
        }
        Some(Ok(RawRecord::new(line, fields)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: &str = "R1C0,R1C1,R1C2,R1C3\nR2C0,R2C1,R2C2,R2C3\nR3C0,R3C1,R3C2,R3C3\n";

    fn read(input: &str, options: &CsvOptions) -> Result<Vec<RawRecord>> {
        CsvSource::from_reader(input.as_bytes(), options)?.collect()
    }

    #[test]
    fn test_header_is_skipped_and_names_fields() {
        let options = CsvOptions {
            columns: vec![Column::Index(1), Column::Index(3)],
            ..CsvOptions::default()
        };
        let rows = read(GRID, &options).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].fields["R1C1"], "R2C1");
        assert_eq!(rows[0].fields["R1C3"], "R2C3");
        assert_eq!(rows[0].fields.len(), 2);
    }

    #[test]
    fn test_without_header_every_row_is_data() {
        let options = CsvOptions {
            has_header: false,
            columns: vec![1.into(), 3.into()],
            ..CsvOptions::default()
        };
        let rows = read(GRID, &options).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].fields["1"], "R1C1");
        assert_eq!(rows[2].fields["3"], "R3C3");
    }

    #[test]
    fn test_columns_by_name_and_typed_values() {
        let input = "id,name,score\n1,alice,10\n2,bob,\n";
        let options = CsvOptions {
            columns: vec!["id".into(), "score".into()],
            typed: true,
            ..CsvOptions::default()
        };
        let rows = read(input, &options).unwrap();
        assert_eq!(rows[0].fields["id"], 1);
        assert_eq!(rows[0].fields["score"], 10);
        assert_eq!(rows[1].fields["score"], Value::Null);
        assert!(!rows[0].fields.contains_key("name"));
    }

    #[test]
    fn test_unknown_or_headerless_name_is_rejected() {
        let options = CsvOptions {
            columns: vec!["missing".into()],
            ..CsvOptions::default()
        };
        assert!(matches!(read(GRID, &options), Err(Error::InvalidArgument(_))));

        let options = CsvOptions {
            has_header: false,
            columns: vec!["R1C0".into()],
            ..CsvOptions::default()
        };
        assert!(matches!(read(GRID, &options), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_short_row_is_invalid_record() {
        let input = "a,b\n1,2\n3\n";
        let options = CsvOptions {
            columns: vec![Column::Index(1)],
            ..CsvOptions::default()
        };
        let err = read(input, &options).unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { line: 3, .. }));
    }
}
