//! Coercion of raw API records into column-keyed values.
//!
//! The normalizer is a pure transform: it maps external field names
//! through the configured [`FieldMap`] and coerces each JSON value to
//! fit the declared type of its target column. Statements are bound as
//! parameters downstream, so no escaping happens here; the semantic
//! rules are:
//!
//! 1. JSON null, and the reserved marker string `"null"`, become the
//!    null value.
//! 2. Numeric columns: booleans become 0/1, integers stay integers,
//!    everything else must parse as a float.
//! 3. Text columns: booleans become `"1"`/`"0"`, numbers render in
//!    decimal, strings pass through.
//!
//! A value that cannot be coerced to a numeric column is a data-quality
//! defect and surfaces as an error; it is never silently dropped.

use serde_json::Value;

use crate::config::FieldMap;
use crate::error::{Error, Result};
use crate::model::{ColumnValue, NormalizedRecord, RawRecord, TableSchema};

/// Normalize one fetched record.
///
/// External fields without a mapping are ignored. Mapped fields absent
/// from the record stay absent from the output, which later means "no
/// opinion" during comparison.
///
/// # Errors
///
/// Returns `Coercion` when a value does not fit its numeric column.
pub fn normalize(
    raw: &RawRecord,
    map: &FieldMap,
    schema: &TableSchema,
) -> Result<NormalizedRecord> {
    let mut record = NormalizedRecord::new();
    for (external, value) in raw {
        let Ok(column) = map.to_store_column(external) else {
            continue;
        };
        let Some(numeric) = schema.is_numeric(column) else {
            continue;
        };
        record.insert(column.to_string(), coerce(value, numeric, column)?);
    }
    Ok(record)
}

fn coerce(value: &Value, numeric: bool, column: &str) -> Result<ColumnValue> {
    match value {
        Value::Null => Ok(ColumnValue::Null),
        Value::String(s) if s == "null" => Ok(ColumnValue::Null),
        _ if numeric => coerce_numeric(value, column),
        Value::Bool(b) => Ok(ColumnValue::Text(if *b { "1" } else { "0" }.to_string())),
        Value::String(s) => Ok(ColumnValue::Text(s.clone())),
        // Nested arrays/objects serialize to compact JSON text.
        other => Ok(ColumnValue::Text(other.to_string())),
    }
}

fn coerce_numeric(value: &Value, column: &str) -> Result<ColumnValue> {
    match value {
        Value::Bool(b) => Ok(ColumnValue::Int(i64::from(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(ColumnValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(ColumnValue::Float(f))
            } else {
                Err(coercion_error(column, value))
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(ColumnValue::Float)
            .map_err(|_| coercion_error(column, value)),
        _ => Err(coercion_error(column, value)),
    }
}

fn coercion_error(column: &str, value: &Value) -> Error {
    Error::Coercion {
        column: column.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ColumnInfo;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            ColumnInfo { name: "id".to_string(), numeric: true },
            ColumnInfo { name: "title".to_string(), numeric: false },
            ColumnInfo { name: "score".to_string(), numeric: true },
            ColumnInfo { name: "airing".to_string(), numeric: true },
            ColumnInfo { name: "note".to_string(), numeric: false },
        ])
    }

    fn map() -> FieldMap {
        let mut columns = BTreeMap::new();
        columns.insert("mal_id".to_string(), "id".to_string());
        columns.insert("title".to_string(), "title".to_string());
        columns.insert("score".to_string(), "score".to_string());
        columns.insert("airing".to_string(), "airing".to_string());
        columns.insert("note".to_string(), "note".to_string());
        FieldMap::new(&columns).unwrap()
    }

    fn raw(value: serde_json::Value) -> RawRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_null_and_marker_collapse() {
        let record = normalize(
            &raw(json!({"title": null, "note": "null"})),
            &map(),
            &schema(),
        )
        .unwrap();
        assert_eq!(record["title"], ColumnValue::Null);
        assert_eq!(record["note"], ColumnValue::Null);
    }

    #[test]
    fn test_integer_stays_integer() {
        let record = normalize(&raw(json!({"mal_id": 42})), &map(), &schema()).unwrap();
        assert_eq!(record["id"], ColumnValue::Int(42));
    }

    #[test]
    fn test_numeric_string_becomes_float() {
        let record = normalize(&raw(json!({"score": "8.25"})), &map(), &schema()).unwrap();
        assert_eq!(record["score"], ColumnValue::Float(8.25));
    }

    #[test]
    fn test_bool_coercions_by_column_type() {
        let record = normalize(
            &raw(json!({"airing": true, "note": false})),
            &map(),
            &schema(),
        )
        .unwrap();
        assert_eq!(record["airing"], ColumnValue::Int(1));
        assert_eq!(record["note"], ColumnValue::Text("0".to_string()));
    }

    #[test]
    fn test_number_to_text_column() {
        let record = normalize(&raw(json!({"title": 1999})), &map(), &schema()).unwrap();
        assert_eq!(record["title"], ColumnValue::Text("1999".to_string()));
    }

    #[test]
    fn test_unmapped_fields_ignored() {
        let record = normalize(
            &raw(json!({"mal_id": 1, "synopsis": "long text"})),
            &map(),
            &schema(),
        )
        .unwrap();
        assert_eq!(record.len(), 1);
        assert!(record.contains_key("id"));
    }

    #[test]
    fn test_absent_fields_stay_absent() {
        let record = normalize(&raw(json!({"mal_id": 1})), &map(), &schema()).unwrap();
        assert!(!record.contains_key("title"));
        assert!(!record.contains_key("score"));
    }

    #[test]
    fn test_bad_numeric_value_errors() {
        let result = normalize(&raw(json!({"score": "n/a"})), &map(), &schema());
        assert!(matches!(result, Err(Error::Coercion { column, .. }) if column == "score"));
    }

    #[test]
    fn test_nested_value_serializes_for_text_column() {
        let record = normalize(
            &raw(json!({"note": {"lang": "en"}})),
            &map(),
            &schema(),
        )
        .unwrap();
        assert_eq!(record["note"], ColumnValue::Text("{\"lang\":\"en\"}".to_string()));
    }
}
