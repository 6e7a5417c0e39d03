//! SQLite store implementation.
//!
//! The mirrored table is user-supplied: its name, columns, and declared
//! types all come from the deployment, so every operation here works
//! against the schema read at runtime rather than a compiled-in one.
//! Each statement commits on its own; there is no cross-record
//! transaction, which keeps a crash between records recoverable from
//! the cursor alone.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::{ColumnInfo, ColumnValue, NormalizedRecord, StoredRow, TableSchema};

/// SQLite-backed store for the mirrored table.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_conn(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        Self::from_conn(Connection::open_in_memory()?)
    }

    /// Open with bounded retries and fixed backoff.
    ///
    /// Retrying happens at startup only; once the loop runs, store
    /// errors are fatal to the run.
    ///
    /// # Errors
    ///
    /// Returns `Connection` after the final attempt fails.
    pub fn open_with_retry(path: &Path, retries: u32, backoff: Duration) -> Result<Self> {
        let mut attempt: u32 = 0;
        loop {
            match Connection::open(path) {
                Ok(conn) => return Self::from_conn(conn),
                Err(source) => {
                    attempt += 1;
                    if attempt > retries {
                        return Err(Error::Connection { attempts: attempt, source });
                    }
                    warn!("store connection attempt {attempt} failed: {source}; retrying");
                    std::thread::sleep(backoff);
                }
            }
        }
    }

    fn from_conn(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Read the mirrored table's columns and their numeric-ness.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the table does not exist.
    pub fn describe_columns(&self, table: &str) -> Result<TableSchema> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let rows = stmt.query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut columns = Vec::new();
        for row in rows {
            let (name, declared) = row?;
            columns.push(ColumnInfo { name, numeric: declared_numeric(&declared) });
        }

        if columns.is_empty() {
            return Err(Error::Config(format!(
                "table `{table}` does not exist in the database"
            )));
        }
        Ok(TableSchema::new(columns))
    }

    /// Select every row whose unique column equals `value`.
    ///
    /// Zero rows means the record is absent; more than one signals a
    /// uniqueness breach the caller must handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_by_unique(
        &self,
        table: &str,
        unique_column: &str,
        value: &ColumnValue,
    ) -> Result<Vec<StoredRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1",
            quote_ident(table),
            quote_ident(unique_column)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        let mut rows = stmt.query(rusqlite::params![value])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut stored = StoredRow::new();
            for (i, name) in names.iter().enumerate() {
                stored.insert(name.clone(), ColumnValue::from_sql(row.get_ref(i)?));
            }
            out.push(stored);
        }
        Ok(out)
    }

    /// Insert a full row, writing NULL for columns the record lacks.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_row(
        &self,
        table: &str,
        schema: &TableSchema,
        record: &NormalizedRecord,
    ) -> Result<()> {
        let column_list: Vec<String> = schema
            .columns()
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect();
        let placeholders: Vec<String> = (1..=schema.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            column_list.join(", "),
            placeholders.join(", ")
        );

        let values: Vec<&ColumnValue> = schema
            .columns()
            .iter()
            .map(|c| record.get(&c.name).unwrap_or(&ColumnValue::Null))
            .collect();
        self.conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(())
    }

    /// Update only the named columns of the row matching the unique value.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_columns(
        &self,
        table: &str,
        unique_column: &str,
        unique: &ColumnValue,
        columns: &[String],
        record: &NormalizedRecord,
    ) -> Result<usize> {
        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ?{}", quote_ident(c), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(table),
            assignments.join(", "),
            quote_ident(unique_column),
            columns.len() + 1
        );

        let mut values: Vec<&ColumnValue> = columns
            .iter()
            .map(|c| record.get(c).unwrap_or(&ColumnValue::Null))
            .collect();
        values.push(unique);
        let changed = self.conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(changed)
    }

    /// Count rows in a table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Quote an identifier for interpolation into SQL text.
///
/// Values are always bound; this is only for table and column names,
/// which SQLite cannot take as parameters.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn declared_numeric(declared: &str) -> bool {
    let upper = declared.to_ascii_uppercase();
    ["INT", "REAL", "FLOA", "DOUB", "NUM", "DEC", "BOOL"]
        .iter()
        .any(|k| upper.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_memory().unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TABLE anime (
                    id INTEGER,
                    title TEXT,
                    score REAL,
                    airing BOOLEAN,
                    synopsis TEXT
                )",
            )
            .unwrap();
        store
    }

    fn sample_record() -> NormalizedRecord {
        let mut record = NormalizedRecord::new();
        record.insert("id".to_string(), ColumnValue::Int(1));
        record.insert("title".to_string(), ColumnValue::Text("Cowboy Bebop".to_string()));
        record.insert("score".to_string(), ColumnValue::Float(8.8));
        record
    }

    #[test]
    fn test_describe_columns_numeric_detection() {
        let store = store_with_table();
        let schema = store.describe_columns("anime").unwrap();
        assert_eq!(schema.len(), 5);
        assert_eq!(schema.is_numeric("id"), Some(true));
        assert_eq!(schema.is_numeric("score"), Some(true));
        assert_eq!(schema.is_numeric("airing"), Some(true));
        assert_eq!(schema.is_numeric("title"), Some(false));
    }

    #[test]
    fn test_describe_missing_table_is_config_error() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(matches!(
            store.describe_columns("nope"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_insert_fills_unmapped_columns_with_null() {
        let store = store_with_table();
        let schema = store.describe_columns("anime").unwrap();
        store.insert_row("anime", &schema, &sample_record()).unwrap();

        let rows = store
            .find_by_unique("anime", "id", &ColumnValue::Int(1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["title"], ColumnValue::Text("Cowboy Bebop".to_string()));
        assert_eq!(rows[0]["airing"], ColumnValue::Null);
        assert_eq!(rows[0]["synopsis"], ColumnValue::Null);
    }

    #[test]
    fn test_update_touches_only_named_columns() {
        let store = store_with_table();
        let schema = store.describe_columns("anime").unwrap();
        store.insert_row("anime", &schema, &sample_record()).unwrap();

        let mut changed = sample_record();
        changed.insert("score".to_string(), ColumnValue::Float(9.0));
        changed.insert("title".to_string(), ColumnValue::Text("should not land".to_string()));
        let n = store
            .update_columns(
                "anime",
                "id",
                &ColumnValue::Int(1),
                &["score".to_string()],
                &changed,
            )
            .unwrap();
        assert_eq!(n, 1);

        let rows = store
            .find_by_unique("anime", "id", &ColumnValue::Int(1))
            .unwrap();
        assert_eq!(rows[0]["score"], ColumnValue::Float(9.0));
        assert_eq!(rows[0]["title"], ColumnValue::Text("Cowboy Bebop".to_string()));
    }

    #[test]
    fn test_find_returns_every_matching_row() {
        let store = store_with_table();
        let schema = store.describe_columns("anime").unwrap();
        store.insert_row("anime", &schema, &sample_record()).unwrap();
        store.insert_row("anime", &schema, &sample_record()).unwrap();

        let rows = store
            .find_by_unique("anime", "id", &ColumnValue::Int(1))
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("plain"), "\"plain\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_open_with_retry_gives_up() {
        let dir = tempfile::TempDir::new().unwrap();
        // A directory is not a valid database file path.
        let result =
            SqliteStore::open_with_retry(dir.path(), 1, Duration::from_millis(1));
        assert!(matches!(result, Err(Error::Connection { attempts: 2, .. })));
    }

    #[test]
    fn test_count_rows() {
        let store = store_with_table();
        let schema = store.describe_columns("anime").unwrap();
        assert_eq!(store.count_rows("anime").unwrap(), 0);
        store.insert_row("anime", &schema, &sample_record()).unwrap();
        assert_eq!(store.count_rows("anime").unwrap(), 1);
    }
}
