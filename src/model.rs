//! Value and schema types shared across the sync pipeline.
//!
//! A fetched record starts life as a [`RawRecord`] (JSON field names and
//! values as the API sent them), is normalized into column-keyed
//! [`ColumnValue`]s, and is compared against a [`StoredRow`] read back
//! from the table described by a [`TableSchema`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};

/// One record as fetched from the API: external field name to JSON value.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A coercion-applied record keyed by store column name.
///
/// Produced by [`crate::normalize::normalize`]; columns the API did not
/// send are simply absent.
pub type NormalizedRecord = BTreeMap<String, ColumnValue>;

/// One row read back from the store, keyed by column name.
pub type StoredRow = BTreeMap<String, ColumnValue>;

/// A single column value, either incoming or stored.
///
/// JSON null and the reserved marker string `"null"` both collapse to
/// [`ColumnValue::Null`], which is written as SQL NULL and compares
/// equal only to another null.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl ColumnValue {
    /// True for the null marker.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, parsing text if needed.
    ///
    /// Stored numeric columns occasionally hold text like `"12"`; those
    /// still take part in numeric comparison.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Textual view of the value. `None` for null.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Null => None,
            Self::Int(i) => Some(Cow::Owned(i.to_string())),
            Self::Float(f) => Some(Cow::Owned(f.to_string())),
            Self::Text(s) => Some(Cow::Borrowed(s)),
        }
    }

    /// Convert a value read from a SQLite row.
    #[must_use]
    pub fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Int(i),
            ValueRef::Real(f) => Self::Float(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Text(String::from_utf8_lossy(b).into_owned()),
        }
    }
}

impl std::fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl ToSql for ColumnValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqlValue::Null),
            Self::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Self::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// One column of the mirrored table.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name as declared in the table.
    pub name: String,
    /// Whether the declared type is numeric (INTEGER, REAL, NUMERIC, ...).
    pub numeric: bool,
}

/// The mirrored table's columns in declaration order.
///
/// Obtained once from the store at driver construction; both the
/// normalizer (numeric vs text coercion) and the comparison (column
/// order, type-aware equality) key off it.
#[derive(Debug, Clone)]
pub struct TableSchema {
    columns: Vec<ColumnInfo>,
}

impl TableSchema {
    /// Build a schema from columns in table declaration order.
    #[must_use]
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self { columns }
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Look up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Numeric-ness of a column, `None` if the column is not in the table.
    #[must_use]
    pub fn is_numeric(&self, name: &str) -> Option<bool> {
        self.get(name).map(|c| c.numeric)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when the table has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_f64_parses_text() {
        assert_eq!(ColumnValue::Int(12).as_f64(), Some(12.0));
        assert_eq!(ColumnValue::Text("12.0".to_string()).as_f64(), Some(12.0));
        assert_eq!(ColumnValue::Text(" 7 ".to_string()).as_f64(), Some(7.0));
        assert_eq!(ColumnValue::Text("abc".to_string()).as_f64(), None);
        assert_eq!(ColumnValue::Null.as_f64(), None);
    }

    #[test]
    fn test_as_text_renders_numbers() {
        assert_eq!(ColumnValue::Int(5).as_text().as_deref(), Some("5"));
        assert_eq!(ColumnValue::Float(5.5).as_text().as_deref(), Some("5.5"));
        assert_eq!(ColumnValue::Null.as_text(), None);
    }

    #[test]
    fn test_from_sql_variants() {
        assert_eq!(ColumnValue::from_sql(ValueRef::Null), ColumnValue::Null);
        assert_eq!(ColumnValue::from_sql(ValueRef::Integer(3)), ColumnValue::Int(3));
        assert_eq!(
            ColumnValue::from_sql(ValueRef::Text(b"hi")),
            ColumnValue::Text("hi".to_string())
        );
    }

    #[test]
    fn test_schema_lookup() {
        let schema = TableSchema::new(vec![
            ColumnInfo { name: "id".to_string(), numeric: true },
            ColumnInfo { name: "title".to_string(), numeric: false },
        ]);
        assert_eq!(schema.is_numeric("id"), Some(true));
        assert_eq!(schema.is_numeric("title"), Some(false));
        assert_eq!(schema.is_numeric("missing"), None);
        assert_eq!(schema.len(), 2);
    }
}
