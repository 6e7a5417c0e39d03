//! Verified insert/update execution.
//!
//! The executor turns a reconciliation decision into at most one write,
//! then re-reads the row to confirm the write actually took. The store
//! is shared with external writers, so a successful statement is not
//! proof the row now matches: verification distinguishes a confirmed
//! write from one that silently failed or raced, and detects a
//! duplicate appearing under the unique key.

use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::model::{ColumnValue, NormalizedRecord, TableSchema};
use crate::reconcile::{self, Decision};
use crate::storage::SqliteStore;

/// What applying a decision did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed and the row now matches the record.
    Confirmed,
    /// The row was already identical; nothing written.
    Skipped,
    /// The unique key was ambiguous; writing was refused.
    Rejected,
    /// A write was issued but the re-read still diverges.
    StillDivergent,
    /// The re-read found more than one row for the unique key.
    Ambiguous,
}

impl WriteOutcome {
    /// Short label for logging.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Skipped => "skipped",
            Self::Rejected => "rejected",
            Self::StillDivergent => "still-divergent",
            Self::Ambiguous => "ambiguous",
        }
    }
}

/// Executes a decision against one table.
pub struct Upserter<'a> {
    store: &'a SqliteStore,
    table: &'a str,
    unique_column: &'a str,
    schema: &'a TableSchema,
}

impl<'a> Upserter<'a> {
    /// Bind an executor to the mirrored table.
    #[must_use]
    pub fn new(
        store: &'a SqliteStore,
        table: &'a str,
        unique_column: &'a str,
        schema: &'a TableSchema,
    ) -> Self {
        Self { store, table, unique_column, schema }
    }

    /// Apply a decision, then verify the result with a fresh read.
    ///
    /// # Errors
    ///
    /// Returns `MissingUniqueField` when the record lacks its unique
    /// value, or a database error from the write/verify statements.
    pub fn apply(&self, decision: &Decision, record: &NormalizedRecord) -> Result<WriteOutcome> {
        let unique = self.unique_value(record)?;

        match decision {
            Decision::Identical => {
                debug!("{}={unique}: row already current", self.unique_column);
                return Ok(WriteOutcome::Skipped);
            }
            Decision::Ambiguous { rows } => {
                error!(
                    "{}={unique}: {rows} rows share the unique key; refusing to write",
                    self.unique_column
                );
                return Ok(WriteOutcome::Rejected);
            }
            Decision::Absent => {
                debug!("{}={unique}: inserting new row", self.unique_column);
                self.store.insert_row(self.table, self.schema, record)?;
            }
            Decision::Divergent { columns } => {
                debug!(
                    "{}={unique}: updating {} column(s): {}",
                    self.unique_column,
                    columns.len(),
                    columns.join(", ")
                );
                self.store
                    .update_columns(self.table, self.unique_column, unique, columns, record)?;
            }
        }

        self.verify(unique, record)
    }

    /// Re-read the row after a write and classify what the store holds now.
    fn verify(&self, unique: &ColumnValue, record: &NormalizedRecord) -> Result<WriteOutcome> {
        let rows = self
            .store
            .find_by_unique(self.table, self.unique_column, unique)?;
        match reconcile::compare(record, &rows, self.schema) {
            Decision::Identical => Ok(WriteOutcome::Confirmed),
            Decision::Ambiguous { rows } => {
                error!(
                    "{}={unique}: {rows} rows after write; duplicate created upstream",
                    self.unique_column
                );
                Ok(WriteOutcome::Ambiguous)
            }
            Decision::Absent | Decision::Divergent { .. } => {
                error!("{}={unique}: write did not take", self.unique_column);
                Ok(WriteOutcome::StillDivergent)
            }
        }
    }

    fn unique_value<'r>(&self, record: &'r NormalizedRecord) -> Result<&'r ColumnValue> {
        record
            .get(self.unique_column)
            .ok_or_else(|| Error::MissingUniqueField { column: self.unique_column.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StoredRow;

    fn store_with_table() -> (SqliteStore, TableSchema) {
        let store = SqliteStore::open_memory().unwrap();
        store
            .conn()
            .execute_batch(
                "CREATE TABLE anime (id INTEGER, title TEXT, score REAL)",
            )
            .unwrap();
        let schema = store.describe_columns("anime").unwrap();
        (store, schema)
    }

    fn record(id: i64, title: &str, score: f64) -> NormalizedRecord {
        let mut record = NormalizedRecord::new();
        record.insert("id".to_string(), ColumnValue::Int(id));
        record.insert("title".to_string(), ColumnValue::Text(title.to_string()));
        record.insert("score".to_string(), ColumnValue::Float(score));
        record
    }

    fn check(store: &SqliteStore, schema: &TableSchema, record: &NormalizedRecord) -> Decision {
        let rows = store
            .find_by_unique("anime", "id", record.get("id").unwrap())
            .unwrap();
        reconcile::compare(record, &rows, schema)
    }

    #[test]
    fn test_absent_inserts_and_confirms() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let record = record(1, "Cowboy Bebop", 8.8);

        let outcome = upserter.apply(&Decision::Absent, &record).unwrap();
        assert_eq!(outcome, WriteOutcome::Confirmed);
        assert_eq!(store.count_rows("anime").unwrap(), 1);
    }

    #[test]
    fn test_identical_skips_without_writing() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let record = record(1, "Cowboy Bebop", 8.8);
        upserter.apply(&Decision::Absent, &record).unwrap();

        let outcome = upserter.apply(&Decision::Identical, &record).unwrap();
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert_eq!(store.count_rows("anime").unwrap(), 1);
    }

    #[test]
    fn test_divergent_updates_only_changed_column_and_confirms() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let original = record(1, "Cowboy Bebop", 8.8);
        upserter.apply(&Decision::Absent, &original).unwrap();

        let updated = record(1, "Cowboy Bebop", 9.0);
        let decision = check(&store, &schema, &updated);
        assert_eq!(
            decision,
            Decision::Divergent { columns: vec!["score".to_string()] }
        );

        let outcome = upserter.apply(&decision, &updated).unwrap();
        assert_eq!(outcome, WriteOutcome::Confirmed);
        assert_eq!(check(&store, &schema, &updated), Decision::Identical);
    }

    #[test]
    fn test_ambiguous_refuses_to_write() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let record = record(1, "Cowboy Bebop", 8.8);
        // Two rows with the same unique key: a pre-existing defect.
        store.insert_row("anime", &schema, &record).unwrap();
        store.insert_row("anime", &schema, &record).unwrap();

        let decision = check(&store, &schema, &record);
        assert_eq!(decision, Decision::Ambiguous { rows: 2 });

        let outcome = upserter.apply(&decision, &record).unwrap();
        assert_eq!(outcome, WriteOutcome::Rejected);
        assert_eq!(store.count_rows("anime").unwrap(), 2);
    }

    #[test]
    fn test_verification_detects_duplicate_after_write() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let record = record(1, "Cowboy Bebop", 8.8);
        // A concurrent writer already inserted the row; our insert will
        // land a second copy and verification must flag it.
        store.insert_row("anime", &schema, &record).unwrap();

        let outcome = upserter.apply(&Decision::Absent, &record).unwrap();
        assert_eq!(outcome, WriteOutcome::Ambiguous);
    }

    #[test]
    fn test_missing_unique_value_is_an_error() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let mut record = NormalizedRecord::new();
        record.insert("title".to_string(), ColumnValue::Text("x".to_string()));

        let result = upserter.apply(&Decision::Absent, &record);
        assert!(matches!(result, Err(Error::MissingUniqueField { .. })));
    }

    #[test]
    fn test_verify_classifies_external_tampering() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        let record = record(1, "Cowboy Bebop", 8.8);
        upserter.apply(&Decision::Absent, &record).unwrap();

        // Simulate an external writer clobbering the row between our
        // write and a later verification pass.
        store
            .conn()
            .execute("UPDATE anime SET title = 'clobbered' WHERE id = 1", [])
            .unwrap();
        let outcome = upserter
            .verify(&ColumnValue::Int(1), &record)
            .unwrap();
        assert_eq!(outcome, WriteOutcome::StillDivergent);
    }

    #[test]
    fn test_row_reads_back_every_column() {
        let (store, schema) = store_with_table();
        let upserter = Upserter::new(&store, "anime", "id", &schema);
        upserter
            .apply(&Decision::Absent, &record(2, "Trigun", 8.2))
            .unwrap();

        let rows = store
            .find_by_unique("anime", "id", &ColumnValue::Int(2))
            .unwrap();
        let row: &StoredRow = &rows[0];
        assert_eq!(row.len(), schema.len());
    }
}
