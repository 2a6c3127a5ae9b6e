//! Table layout for synced datasets.
//!
//! A synced table has one column per key part, one column per content
//! property, and a `synced_at` bookkeeping column (Unix millis of the last
//! write by importsync). Columns are declared without a type so SQLite keeps
//! each value with the storage class it was written with.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Name of the bookkeeping column added to every synced table.
pub const SYNCED_AT_COLUMN: &str = "synced_at";

/// Describes how a dataset maps onto a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    table: String,
    key_columns: Vec<String>,
    content_columns: Vec<String>,
}

impl TableSpec {
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if there is no key column, a column
    /// is listed twice, or a column is named `synced_at`.
    pub fn new<K, C>(table: impl Into<String>, key_columns: K, content_columns: C) -> Result<Self>
    where
        K: IntoIterator,
        K::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let spec = Self {
            table: table.into(),
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            content_columns: content_columns.into_iter().map(Into::into).collect(),
        };

        if spec.table.is_empty() {
            return Err(Error::InvalidArgument("table name is empty".to_string()));
        }
        if spec.key_columns.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one key column is required".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for column in spec.columns() {
            if column == SYNCED_AT_COLUMN {
                return Err(Error::InvalidArgument(format!(
                    "column name `{SYNCED_AT_COLUMN}` is reserved"
                )));
            }
            if !seen.insert(column) {
                return Err(Error::InvalidArgument(format!(
                    "column `{column}` is listed twice"
                )));
            }
        }
        Ok(spec)
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    #[must_use]
    pub fn content_columns(&self) -> &[String] {
        &self.content_columns
    }

    /// Key columns followed by content columns.
    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.key_columns.iter().chain(&self.content_columns)
    }

    // ── SQL ───────────────────────────────────────────────────

    pub(crate) fn create_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .key_columns
            .iter()
            .map(|c| format!("{} NOT NULL", quote_ident(c)))
            .collect();
        defs.extend(self.content_columns.iter().map(|c| quote_ident(c)));
        defs.push(format!("{} INTEGER", quote_ident(SYNCED_AT_COLUMN)));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, PRIMARY KEY ({}))",
            quote_ident(&self.table),
            defs.join(", "),
            self.key_list()
        )
    }

    /// `SELECT` of all columns in key order, optionally after a key bound
    /// (`?1..?n` for the key, `?n+1` for the limit).
    pub(crate) fn select_sql(&self, after_key: bool, limit: bool) -> String {
        let n = self.key_columns.len();
        let columns: Vec<String> = self.columns().map(|c| quote_ident(c)).collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            quote_ident(&self.table)
        );
        if after_key {
            let params: Vec<String> = (1..=n).map(|i| format!("?{i}")).collect();
            sql.push_str(&format!(
                " WHERE ({}) > ({})",
                self.key_list(),
                params.join(", ")
            ));
        }
        sql.push_str(&format!(" ORDER BY {}", self.key_list()));
        if limit {
            let index = if after_key { n + 1 } else { 1 };
            sql.push_str(&format!(" LIMIT ?{index}"));
        }
        sql
    }

    /// `INSERT` binding keys, then contents, then `synced_at`.
    pub(crate) fn insert_sql(&self) -> String {
        let columns: Vec<String> = self
            .columns()
            .map(String::as_str)
            .chain([SYNCED_AT_COLUMN])
            .map(quote_ident)
            .collect();
        let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            columns.join(", "),
            params.join(", ")
        )
    }

    /// `UPDATE` binding keys, then contents, then `synced_at`.
    pub(crate) fn update_sql(&self) -> String {
        let n = self.key_columns.len();
        let sets: Vec<String> = self
            .content_columns
            .iter()
            .map(String::as_str)
            .chain([SYNCED_AT_COLUMN])
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), n + i + 1))
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {}",
            quote_ident(&self.table),
            sets.join(", "),
            self.key_predicate()
        )
    }

    /// `DELETE` binding keys.
    pub(crate) fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            quote_ident(&self.table),
            self.key_predicate()
        )
    }

    fn key_list(&self) -> String {
        self.key_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_predicate(&self) -> String {
        self.key_columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Quote an SQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Apply connection pragmas.
///
/// File databases switch to WAL so a reader connection can stream a table
/// while another connection writes.
///
/// # Errors
///
/// Returns an error if a pragma cannot be set.
pub fn apply_pragmas(conn: &Connection, in_memory: bool) -> Result<()> {
    if !in_memory {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", "-64000")?; // 64MB cache
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TableSpec {
        TableSpec::new("items", ["org", "id"], ["name"]).unwrap()
    }

    #[test]
    fn test_create_sql() {
        assert_eq!(
            spec().create_sql(),
            "CREATE TABLE IF NOT EXISTS \"items\" (\"org\" NOT NULL, \"id\" NOT NULL, \
             \"name\", \"synced_at\" INTEGER, PRIMARY KEY (\"org\", \"id\"))"
        );
    }

    #[test]
    fn test_keyset_select_sql() {
        assert_eq!(
            spec().select_sql(true, true),
            "SELECT \"org\", \"id\", \"name\" FROM \"items\" \
             WHERE (\"org\", \"id\") > (?1, ?2) ORDER BY \"org\", \"id\" LIMIT ?3"
        );
        assert_eq!(
            spec().select_sql(false, true),
            "SELECT \"org\", \"id\", \"name\" FROM \"items\" ORDER BY \"org\", \"id\" LIMIT ?1"
        );
    }

    #[test]
    fn test_write_sql_parameter_order() {
        let spec = spec();
        assert_eq!(
            spec.update_sql(),
            "UPDATE \"items\" SET \"name\" = ?3, \"synced_at\" = ?4 \
             WHERE \"org\" = ?1 AND \"id\" = ?2"
        );
        assert!(spec.insert_sql().ends_with("VALUES (?1, ?2, ?3, ?4)"));
        assert_eq!(
            spec.delete_sql(),
            "DELETE FROM \"items\" WHERE \"org\" = ?1 AND \"id\" = ?2"
        );
    }

    #[test]
    fn test_invalid_specs() {
        assert!(TableSpec::new("t", Vec::<String>::new(), ["a"]).is_err());
        assert!(TableSpec::new("t", ["a"], ["a"]).is_err());
        assert!(TableSpec::new("t", ["id"], ["synced_at"]).is_err());
        assert!(TableSpec::new("", ["id"], Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
