//! Field-by-field comparison of an incoming record against stored rows.
//!
//! The comparison is type-aware: numeric columns compare as floats (so a
//! stored `12` equals an incoming `"12.0"`), everything else compares as
//! text, and null only equals null. Columns the incoming record does not
//! carry are "no opinion" and can never produce a mismatch, so partial
//! API responses never trigger spurious updates.
//!
//! More than one row for a unique key is a uniqueness breach in the
//! store. It is reported as [`Decision::Ambiguous`] and never collapsed
//! into identical-or-divergent.

use crate::model::{ColumnValue, NormalizedRecord, StoredRow, TableSchema};

/// Outcome of comparing an incoming record to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No row for this unique key.
    Absent,
    /// A single row exists and every comparable column matches.
    Identical,
    /// A single row exists and at least one comparable column differs.
    Divergent {
        /// Mismatched column names, in table declaration order.
        columns: Vec<String>,
    },
    /// More than one row matched the unique key.
    Ambiguous {
        /// How many rows matched.
        rows: usize,
    },
}

impl Decision {
    /// Short label for logging.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::Absent => "absent",
            Self::Identical => "identical",
            Self::Divergent { .. } => "divergent",
            Self::Ambiguous { .. } => "ambiguous",
        }
    }
}

/// Compare a normalized record against the rows a unique-key query returned.
#[must_use]
pub fn compare(
    normalized: &NormalizedRecord,
    rows: &[StoredRow],
    schema: &TableSchema,
) -> Decision {
    if rows.len() > 1 {
        return Decision::Ambiguous { rows: rows.len() };
    }
    let Some(row) = rows.first() else {
        return Decision::Absent;
    };

    let mut mismatched = Vec::new();
    for column in schema.columns() {
        let Some(incoming) = normalized.get(&column.name) else {
            continue;
        };
        let Some(stored) = row.get(&column.name) else {
            continue;
        };
        if !values_equal(stored, incoming, column.numeric) {
            mismatched.push(column.name.clone());
        }
    }

    if mismatched.is_empty() {
        Decision::Identical
    } else {
        Decision::Divergent { columns: mismatched }
    }
}

/// Type-aware equality for one column.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn values_equal(stored: &ColumnValue, incoming: &ColumnValue, numeric: bool) -> bool {
    match (stored.is_null(), incoming.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    if numeric {
        match (stored.as_f64(), incoming.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    } else {
        stored.as_text() == incoming.as_text()
    }
}
