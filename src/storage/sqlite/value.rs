//! Conversions between [`Value`] and `SQLite` storage classes.

use crate::models::Value;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        use rusqlite::types::Value as Sql;

        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Sql::Null),
            Self::Bool(b) => ToSqlOutput::Owned(Sql::Integer(i64::from(*b))),
            Self::Int(i) => ToSqlOutput::Owned(Sql::Integer(*i)),
            Self::Real(r) => ToSqlOutput::Owned(Sql::Real(*r)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            Self::Json(v) => ToSqlOutput::Owned(Sql::Text(v.to_string())),
        })
    }
}

/// Copies a borrowed cell into an owned [`Value`].
///
/// Text that is not valid UTF-8 is kept as bytes.
#[must_use]
pub fn from_value_ref(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map_or_else(|_| Value::Blob(bytes.to_vec()), |s| Value::Text(s.to_string())),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use serde_json::json;

    fn echo(conn: &Connection, value: &Value) -> Value {
        conn.query_row("SELECT ?1", [value], |row| Ok(from_value_ref(row.get_ref(0)?)))
            .unwrap()
    }

    #[test]
    fn test_values_bind_as_storage_classes() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(echo(&conn, &Value::Bool(true)), Value::Int(1));
        assert_eq!(echo(&conn, &Value::Int(-7)), Value::Int(-7));
        assert_eq!(echo(&conn, &Value::Real(2.5)), Value::Real(2.5));
        assert_eq!(echo(&conn, &Value::from("hi")), Value::from("hi"));
        assert_eq!(echo(&conn, &Value::Blob(vec![0, 1])), Value::Blob(vec![0, 1]));
        assert_eq!(echo(&conn, &Value::Null), Value::Null);
        assert_eq!(
            echo(&conn, &Value::Json(json!({"k": [1, 2]}))),
            Value::from(r#"{"k":[1,2]}"#)
        );
    }
}
