//! Row decoding.
//!
//! Drivers hand back rows as positional [`Value`] sequences in each
//! backend's own encoding. Decoding maps them onto the table's columns and
//! normalises the encodings: JSON stored as text, booleans stored as 0/1,
//! and numbers or bytes delivered as text by text-protocol drivers.

use crate::models::{ColumnSpec, ColumnType, Record, Table, Value};
use crate::Result;
use std::sync::Arc;

/// Maps raw rows back onto a table's columns.
pub struct ResultDecoder;

impl ResultDecoder {
    /// Decodes one row.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] if the row length differs from the
    /// table's column count.
    pub fn decode_row(table: &Arc<Table>, raw: Vec<Value>) -> Result<Record> {
        // A length mismatch is reported by `Record::from_values`.
        let values = if raw.len() == table.columns().len() {
            table
                .columns()
                .iter()
                .zip(raw)
                .map(|(column, value)| Self::decode_value(column, value))
                .collect()
        } else {
            raw
        };
        Record::from_values(Arc::clone(table), values)
    }

    /// Decodes every row, dropping malformed ones with a warning.
    #[must_use]
    pub fn decode_rows(table: &Arc<Table>, rows: Vec<Vec<Value>>) -> Vec<Record> {
        rows.into_iter()
            .filter_map(|raw| match Self::decode_row(table, raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(table = table.name(), error = %e, "Dropping malformed row");
                    None
                },
            })
            .collect()
    }

    /// Normalises one cell according to its column's abstract type.
    ///
    /// Never fails: undecodable JSON text is kept as text.
    #[must_use]
    pub fn decode_value(column: &ColumnSpec, raw: Value) -> Value {
        match (column.column_type(), raw) {
            (_, Value::Null) => Value::Null,
            (ColumnType::Json | ColumnType::Jsonb, Value::Text(text)) => {
                serde_json::from_str(&text).map_or(Value::Text(text), Value::Json)
            },
            (ColumnType::Json | ColumnType::Jsonb, Value::Blob(bytes)) => {
                serde_json::from_slice(&bytes).map_or(Value::Blob(bytes), Value::Json)
            },
            (ColumnType::Boolean, Value::Int(i)) => Value::Bool(i != 0),
            (ColumnType::Boolean, Value::Text(text)) => match parse_bool_text(&text) {
                Some(flag) => Value::Bool(flag),
                None => Value::Text(text),
            },
            (
                ColumnType::Integer | ColumnType::SmallInt | ColumnType::BigInt | ColumnType::Serial,
                Value::Text(text),
            ) => text.trim().parse().map_or(Value::Text(text), Value::Int),
            (ColumnType::Real, Value::Text(text)) => {
                text.trim().parse().map_or(Value::Text(text), Value::Real)
            },
            (ColumnType::Blob | ColumnType::Bytea, Value::Text(text)) => {
                Value::Blob(text.into_bytes())
            },
            (ColumnType::Real, Value::Int(i)) => {
                Value::Int(i).as_f64().map_or(Value::Int(i), Value::Real)
            },
            (_, other) => other,
        }
    }
}

fn parse_bool_text(text: &str) -> Option<bool> {
    let text = text.trim();
    if ["1", "t", "true"].iter().any(|s| text.eq_ignore_ascii_case(s)) {
        Some(true)
    } else if ["0", "f", "false"].iter().any(|s| text.eq_ignore_ascii_case(s)) {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dialect;
    use crate::Error;
    use serde_json::json;
    use test_case::test_case;

    fn settings() -> Arc<Table> {
        Table::new(
            "settings",
            Dialect::Sqlite,
            vec![
                ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
                ColumnSpec::new("enabled", ColumnType::Boolean).unwrap(),
                ColumnSpec::new("payload", ColumnType::Json).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_decodes_embedded_encodings() {
        let record = ResultDecoder::decode_row(
            &settings(),
            vec![
                Value::Int(1),
                Value::Int(1),
                Value::Text(r#"{"theme":"dark"}"#.to_string()),
            ],
        )
        .unwrap();

        assert_eq!(record.get("enabled"), Some(&Value::Bool(true)));
        assert_eq!(record.get("payload"), Some(&Value::Json(json!({"theme": "dark"}))));
    }

    #[test_case("t", Value::Bool(true); "t")]
    #[test_case("T", Value::Bool(true); "upper t")]
    #[test_case("True", Value::Bool(true); "title true")]
    #[test_case(" TRUE ", Value::Bool(true); "padded upper true")]
    #[test_case("F", Value::Bool(false); "upper f")]
    #[test_case("False", Value::Bool(false); "title false")]
    #[test_case("0", Value::Bool(false); "zero")]
    #[test_case("yes", Value::from("yes"); "unrecognised kept")]
    fn test_boolean_text_is_case_insensitive(raw: &str, expected: Value) {
        let table = settings();
        let column = table.column("enabled").unwrap();
        assert_eq!(ResultDecoder::decode_value(column, Value::from(raw)), expected);
    }

    #[test]
    fn test_invalid_json_keeps_raw_text() {
        let record = ResultDecoder::decode_row(
            &settings(),
            vec![Value::Int(1), Value::Int(0), Value::from("{not json")],
        )
        .unwrap();
        assert_eq!(record.get("payload"), Some(&Value::from("{not json")));
        assert_eq!(record.get("enabled"), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_length_mismatch_is_decode_error() {
        let err = ResultDecoder::decode_row(&settings(), vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_malformed_rows_are_dropped() {
        let rows = vec![
            vec![Value::Int(1), Value::Int(1), Value::Null],
            vec![Value::Int(2)],
            vec![Value::Int(3), Value::Int(0), Value::Null],
        ];
        let records = ResultDecoder::decode_rows(&settings(), rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("id"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_text_protocol_numbers_are_parsed() {
        let id = ColumnSpec::new("id", ColumnType::BigInt).unwrap();
        assert_eq!(ResultDecoder::decode_value(&id, Value::from("42")), Value::Int(42));
        let score = ColumnSpec::new("score", ColumnType::Real).unwrap();
        assert_eq!(ResultDecoder::decode_value(&score, Value::from("1.5")), Value::Real(1.5));
        assert_eq!(ResultDecoder::decode_value(&score, Value::Int(2)), Value::Real(2.0));
    }
}
