//! SQLite storage implementation.
//!
//! This module persists datasets of [`Record`]s into plain tables described
//! by a [`TableSpec`]. Reads come back ordered by key; writes go through
//! [`SqliteStorage::apply_diff`], one IMMEDIATE transaction per diff.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Row, Transaction, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::schema::{TableSpec, apply_pragmas};
use crate::dataset::{Dataset, DiffDataset, MemoryDataset};
use crate::error::{Error, Result};
use crate::model::{ChangeTracker, Content, Element, Key, Record, Scalar};

/// Default busy timeout.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Rows written by [`SqliteStorage::apply_diff`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyStats {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ApplyStats {
    /// Returns total number of rows written.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

impl SqliteStorage {
    /// Open a database at the given path, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        Ok(Self {
            conn: open_connection(path, timeout_ms)?,
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn, true)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create the table described by `spec` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub fn create_table(&self, spec: &TableSpec) -> Result<()> {
        self.conn.execute(&spec.create_sql(), [])?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [table],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Number of rows in the table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, spec: &TableSpec) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", super::schema::quote_ident(spec.table()));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Load the whole table as a dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row has an invalid key.
    pub fn load_all(&self, spec: &TableSpec) -> Result<MemoryDataset<Record>> {
        let mut stmt = self.conn.prepare(&spec.select_sql(false, false))?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(read_record(row, spec)?);
        }
        MemoryDataset::from_elements(records)
    }

    /// Persist the diff recorded by `diff`: inserts for added keys, updates
    /// for changed keys, deletes for removed keys.
    ///
    /// Everything runs in one IMMEDIATE transaction, so the table ends up
    /// with all of the diff or none of it.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement fails. The transaction is rolled
    /// back on error.
    pub fn apply_diff<E, D>(&mut self, spec: &TableSpec, diff: &DiffDataset<E, D>) -> Result<ApplyStats>
    where
        E: Element + Clone,
        D: Dataset<ChangeTracker<E>>,
    {
        let now = chrono::Utc::now().timestamp_millis();
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let stats = write_diff(&tx, spec, diff, now)?;

        tx.commit()?;
        info!(
            table = spec.table(),
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            "Applied diff"
        );
        Ok(stats)
    }
}

fn open_connection(path: &Path, timeout_ms: Option<u64>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(timeout_ms.map_or(BUSY_TIMEOUT, Duration::from_millis))?;
    apply_pragmas(&conn, false)?;
    Ok(conn)
}

fn write_diff<E, D>(
    tx: &Transaction,
    spec: &TableSpec,
    diff: &DiffDataset<E, D>,
    now: i64,
) -> Result<ApplyStats>
where
    E: Element + Clone,
    D: Dataset<ChangeTracker<E>>,
{
    let mut stats = ApplyStats::default();

    let mut insert = tx.prepare(&spec.insert_sql())?;
    for element in diff.added_elements() {
        let mut params = key_params(spec, element.key())?;
        params.extend(content_params(spec, element.content())?);
        params.push(SqlValue::Integer(now));
        insert.execute(params_from_iter(params))?;
        stats.inserted += 1;
    }

    let mut update = tx.prepare(&spec.update_sql())?;
    for (_, element) in diff.changed_elements() {
        let mut params = key_params(spec, element.key())?;
        params.extend(content_params(spec, element.content())?);
        params.push(SqlValue::Integer(now));
        stats.updated += update.execute(params_from_iter(params))?;
    }

    let mut delete = tx.prepare(&spec.delete_sql())?;
    for element in diff.removed_elements() {
        let params = key_params(spec, element.key())?;
        stats.deleted += delete.execute(params_from_iter(params))?;
    }

    debug!(table = spec.table(), total = stats.total(), "Wrote diff");
    Ok(stats)
}

// ── Buffered reads ────────────────────────────────────────────

/// Streams a table in key order, `buffer_size` rows per query.
///
/// Pages are fetched with keyset pagination (`WHERE (k1, k2) > (?, ?)`), so
/// each query starts right after the last key seen and the table is never
/// held in memory. The reader owns its connection and can be moved to
/// another thread.
pub struct BufferedRows {
    conn: Connection,
    spec: TableSpec,
    buffer_size: usize,
    buffer: VecDeque<Record>,
    last: Option<Key>,
    done: bool,
}

impl BufferedRows {
    /// Open a dedicated connection to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `buffer_size` is zero, or an error
    /// if the connection cannot be established.
    pub fn open(path: &Path, spec: TableSpec, buffer_size: usize) -> Result<Self> {
        Self::new(open_connection(path, None)?, spec, buffer_size)
    }

    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `buffer_size` is zero.
    pub fn new(conn: Connection, spec: TableSpec, buffer_size: usize) -> Result<Self> {
        if buffer_size == 0 {
            return Err(Error::InvalidArgument(
                "buffer size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            conn,
            spec,
            buffer_size,
            buffer: VecDeque::new(),
            last: None,
            done: false,
        })
    }

    fn fetch(&mut self) -> Result<()> {
        let limit = i64::try_from(self.buffer_size).unwrap_or(i64::MAX);
        let mut params = match &self.last {
            Some(key) => key_params(&self.spec, key)?,
            None => Vec::new(),
        };
        params.push(SqlValue::Integer(limit));

        let sql = self.spec.select_sql(self.last.is_some(), true);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            self.buffer.push_back(read_record(row, &self.spec)?);
            fetched += 1;
        }

        if fetched < self.buffer_size {
            self.done = true;
        }
        if let Some(record) = self.buffer.back() {
            self.last = Some(record.key().clone());
        }
        debug!(table = self.spec.table(), fetched, "Fetched page");
        Ok(())
    }
}

impl Iterator for BufferedRows {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

// ── Value mapping ─────────────────────────────────────────────

/// Content values map to SQLite storage classes without loss:
///
/// - absent property: `NULL`
/// - string: `TEXT`
/// - integer: `INTEGER`, other finite number: `REAL`
/// - anything else (null, booleans, arrays, objects, integers beyond `i64`):
///   `BLOB` holding the JSON text
fn to_sql(value: &Value) -> Result<SqlValue> {
    let native = match value {
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        Value::Number(n) if n.is_i64() => n.as_i64().map(SqlValue::Integer),
        Value::Number(n) if n.is_f64() => n.as_f64().map(SqlValue::Real),
        _ => None,
    };
    match native {
        Some(v) => Ok(v),
        None => Ok(SqlValue::Blob(serde_json::to_vec(value)?)),
    }
}

/// Inverse of [`to_sql`]; `None` for `NULL`.
fn from_sql(value: ValueRef<'_>, column: &str) -> Result<Option<Value>> {
    let value = match value {
        ValueRef::Null => return Ok(None),
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::from_slice(b).map_err(|e| Error::Build {
            record: format!("column `{column}`"),
            reason: format!("blob is not JSON: {e}"),
        })?,
    };
    Ok(Some(value))
}

/// Key parts are bound as `INTEGER` or `TEXT`. Null and boolean parts have
/// no storage class that sorts and reads back like the key, so they are
/// rejected.
fn key_params(spec: &TableSpec, key: &Key) -> Result<Vec<SqlValue>> {
    if key.len() != spec.key_columns().len() {
        return Err(Error::InvalidArgument(format!(
            "key {key} has {} part(s), table {} has {} key column(s)",
            key.len(),
            spec.table(),
            spec.key_columns().len()
        )));
    }
    key.parts()
        .iter()
        .zip(spec.key_columns())
        .map(|(part, column)| match part {
            Scalar::Int(i) => Ok(SqlValue::Integer(*i)),
            Scalar::Text(s) => Ok(SqlValue::Text(s.clone())),
            Scalar::Null | Scalar::Bool(_) => Err(Error::Build {
                record: key.to_string(),
                reason: format!(
                    "key column `{column}` of {} only stores integer or text parts",
                    spec.table()
                ),
            }),
        })
        .collect()
}

fn content_params(spec: &TableSpec, content: &Content) -> Result<Vec<SqlValue>> {
    spec.content_columns()
        .iter()
        .map(|column| content.get(column).map_or(Ok(SqlValue::Null), to_sql))
        .collect()
}

fn read_record(row: &Row<'_>, spec: &TableSpec) -> Result<Record> {
    let n = spec.key_columns().len();
    let mut parts = Vec::with_capacity(n);
    for (i, column) in spec.key_columns().iter().enumerate() {
        let part = match row.get_ref(i)? {
            ValueRef::Integer(v) => Scalar::Int(v),
            ValueRef::Text(t) => Scalar::Text(String::from_utf8_lossy(t).into_owned()),
            other => {
                return Err(Error::Build {
                    record: format!("row in {}", spec.table()),
                    reason: format!("key column `{column}` holds a {:?}", other.data_type()),
                });
            }
        };
        parts.push(part);
    }

    let mut content = Content::new();
    for (i, column) in spec.content_columns().iter().enumerate() {
        if let Some(value) = from_sql(row.get_ref(n + i)?, column)? {
            content.insert(column.clone(), value);
        }
    }
    Ok(Record::new(Key::new(parts), content))
}
