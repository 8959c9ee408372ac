//! Parameterised CRUD statement generation.
//!
//! Builds `(sql, params)` pairs from a [`Table`] and an [`Intent`]. The
//! placeholder convention is taken from the table's dialect; nothing in
//! this module assumes one convention over another.
//!
//! # Statement Shapes
//!
//! | Intent | SQL |
//! |--------|-----|
//! | `Insert` | `INSERT INTO t (a, b) VALUES (p1, p2) [RETURNING pk]` |
//! | `Update` | `UPDATE t SET a = p1, b = p2 WHERE pk = p3` |
//! | `Delete` | `DELETE FROM t WHERE a = p1 AND b = p2` |
//! | `SelectById` | `SELECT pk, a, b FROM t WHERE pk = p1` |
//! | `SelectByPredicate` | `SELECT pk, a, b FROM t WHERE a = p1 AND b = p2` |
//! | `SelectAll` | `SELECT pk, a, b FROM t` |

use crate::models::{ColumnSpec, Dialect, PlaceholderStyle, Record, Table, Value};
use crate::{Error, Result};
use std::fmt;

/// One equality predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Column name.
    pub column: String,
    /// Value the column must equal; `NULL` renders as `IS NULL`.
    pub value: Value,
}

impl Condition {
    /// Creates `column = value`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// What a statement should do.
#[derive(Debug, Clone, Copy)]
pub enum Intent<'a> {
    /// Insert the record; empty primary-key values are left to the backend.
    Insert(&'a Record),
    /// Update every non-key column of the record, matched by primary key.
    Update(&'a Record),
    /// Delete rows matching every condition.
    Delete(&'a [Condition]),
    /// Select the row with this primary-key value.
    SelectById(&'a Value),
    /// Select rows matching every condition, in caller order.
    SelectByPredicate(&'a [Condition]),
    /// Select every row.
    SelectAll,
}

impl Intent<'_> {
    /// Returns the intent name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Update(_) => "update",
            Self::Delete(_) => "delete",
            Self::SelectById(_) => "select_by_id",
            Self::SelectByPredicate(_) => "select_by_predicate",
            Self::SelectAll => "select_all",
        }
    }
}

/// Statement text plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text in the dialect's placeholder convention.
    pub sql: String,
    /// Parameters in placeholder order.
    pub params: Vec<Value>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -- {} param(s)", self.sql, self.params.len())
    }
}

/// Accumulates parameters and hands out matching placeholders.
struct Params {
    style: PlaceholderStyle,
    dialect: Dialect,
    values: Vec<Value>,
}

impl Params {
    const fn new(dialect: Dialect) -> Self {
        Self {
            style: dialect.placeholder_style(),
            dialect,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, column: &ColumnSpec, value: &Value) -> String {
        self.values.push(prepare_value(column, value, self.dialect));
        self.style.render(self.values.len())
    }
}

/// Converts a value into what the dialect's driver can bind.
///
/// Structured JSON is serialised to text where the backend has no JSON
/// binding; every other value passes through unchanged.
#[must_use]
pub fn prepare_value(column: &ColumnSpec, value: &Value, dialect: Dialect) -> Value {
    match value {
        Value::Json(json) if !dialect.binds_json_natively() || !column.column_type().is_json() => {
            Value::Text(json.to_string())
        },
        other => other.clone(),
    }
}

/// Builds statements for one table.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder<'a> {
    table: &'a Table,
}

impl<'a> StatementBuilder<'a> {
    /// Creates a builder for `table`.
    #[must_use]
    pub const fn new(table: &'a Table) -> Self {
        Self { table }
    }

    /// Builds the statement for `intent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a predicate-based intent has no
    /// conditions, an identity-based intent lacks a primary key or its
    /// value, a condition names an unknown column, a record belongs to a
    /// different table, or an UPDATE has no column to set.
    pub fn build(&self, intent: Intent<'_>) -> Result<Statement> {
        match intent {
            Intent::Insert(record) => self.insert(record),
            Intent::Update(record) => self.update(record),
            Intent::Delete(conditions) => self.delete(conditions),
            Intent::SelectById(id) => self.select_by_id(id),
            Intent::SelectByPredicate(conditions) => self.select_where(conditions),
            Intent::SelectAll => Ok(Statement {
                sql: format!("SELECT {} FROM {}", self.column_list(), self.table.name()),
                params: Vec::new(),
            }),
        }
    }

    fn insert(&self, record: &Record) -> Result<Statement> {
        self.check_record(record)?;
        let mut params = Params::new(self.table.dialect());
        let mut columns = Vec::new();
        let mut placeholders = Vec::new();

        for (column, value) in record.iter() {
            if column.is_primary_key() && value.is_null() {
                continue;
            }
            columns.push(column.name());
            placeholders.push(params.bind(column, value));
        }

        let mut sql = if columns.is_empty() {
            match self.table.dialect() {
                Dialect::MySql => format!("INSERT INTO {} () VALUES ()", self.table.name()),
                Dialect::Postgres | Dialect::Sqlite => {
                    format!("INSERT INTO {} DEFAULT VALUES", self.table.name())
                },
            }
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.table.name(),
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        if self.table.dialect().supports_returning() {
            if let Some(pk) = self.table.primary_key() {
                sql.push_str(" RETURNING ");
                sql.push_str(pk.name());
            }
        }

        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    fn update(&self, record: &Record) -> Result<Statement> {
        self.check_record(record)?;
        let pk = self.require_primary_key("update")?;
        let id = record
            .primary_key_value()
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                Error::Validation(format!(
                    "update on '{}' requires a value for primary key '{}'",
                    self.table.name(),
                    pk.name()
                ))
            })?;

        let mut params = Params::new(self.table.dialect());
        let assignments: Vec<String> = record
            .iter()
            .filter(|(column, _)| !column.is_primary_key())
            .map(|(column, value)| format!("{} = {}", column.name(), params.bind(column, value)))
            .collect();

        if assignments.is_empty() {
            return Err(Error::Validation(format!(
                "update on '{}' has no non-key columns to set",
                self.table.name()
            )));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table.name(),
            assignments.join(", "),
            pk.name(),
            params.bind(pk, id)
        );
        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    fn delete(&self, conditions: &[Condition]) -> Result<Statement> {
        let mut params = Params::new(self.table.dialect());
        let predicate = self.where_clause(conditions, &mut params)?;
        Ok(Statement {
            sql: format!("DELETE FROM {} WHERE {predicate}", self.table.name()),
            params: params.values,
        })
    }

    fn select_by_id(&self, id: &Value) -> Result<Statement> {
        let pk = self.require_primary_key("load by id")?;
        if id.is_null() {
            return Err(Error::Validation(format!(
                "load by id on '{}' requires a non-null identity",
                self.table.name()
            )));
        }
        let mut params = Params::new(self.table.dialect());
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            self.column_list(),
            self.table.name(),
            pk.name(),
            params.bind(pk, id)
        );
        Ok(Statement {
            sql,
            params: params.values,
        })
    }

    fn select_where(&self, conditions: &[Condition]) -> Result<Statement> {
        let mut params = Params::new(self.table.dialect());
        let predicate = self.where_clause(conditions, &mut params)?;
        Ok(Statement {
            sql: format!(
                "SELECT {} FROM {} WHERE {predicate}",
                self.column_list(),
                self.table.name()
            ),
            params: params.values,
        })
    }

    fn where_clause(&self, conditions: &[Condition], params: &mut Params) -> Result<String> {
        if conditions.is_empty() {
            return Err(Error::Validation("at least one condition required".to_string()));
        }
        let mut clauses = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let column = self.table.column(&condition.column).ok_or_else(|| {
                Error::Validation(format!(
                    "table '{}' has no column '{}'",
                    self.table.name(),
                    condition.column
                ))
            })?;
            if condition.value.is_null() {
                clauses.push(format!("{} IS NULL", column.name()));
            } else {
                clauses.push(format!(
                    "{} = {}",
                    column.name(),
                    params.bind(column, &condition.value)
                ));
            }
        }
        Ok(clauses.join(" AND "))
    }

    fn column_list(&self) -> String {
        self.table
            .columns()
            .iter()
            .map(ColumnSpec::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn require_primary_key(&self, operation: &str) -> Result<&'a ColumnSpec> {
        self.table.primary_key().ok_or_else(|| {
            Error::Validation(format!(
                "{operation} on '{}' requires a primary key column",
                self.table.name()
            ))
        })
    }

    fn check_record(&self, record: &Record) -> Result<()> {
        if std::ptr::eq(record.table().as_ref(), self.table) {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "record of table '{}' cannot be written to '{}'",
                record.table().name(),
                self.table.name()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;
    use serde_json::json;
    use std::sync::Arc;
    use test_case::test_case;

    fn users(dialect: Dialect) -> Arc<Table> {
        Table::new(
            "users",
            dialect,
            vec![
                ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
                ColumnSpec::new("name", ColumnType::Text).unwrap(),
                ColumnSpec::new("active", ColumnType::Boolean).unwrap(),
            ],
        )
        .unwrap()
    }

    fn alice(table: &Arc<Table>) -> Record {
        let mut record = table.new_record();
        record.set("name", "Alice").unwrap();
        record.set("active", true).unwrap();
        record
    }

    #[test_case(Dialect::Postgres, "INSERT INTO users (name, active) VALUES ($1, $2) RETURNING id")]
    #[test_case(Dialect::Sqlite, "INSERT INTO users (name, active) VALUES (?, ?)")]
    #[test_case(Dialect::MySql, "INSERT INTO users (name, active) VALUES (%s, %s)")]
    fn test_insert_omits_empty_primary_key(dialect: Dialect, expected: &str) {
        let table = users(dialect);
        let record = alice(&table);
        let stmt = StatementBuilder::new(&table).build(Intent::Insert(&record)).unwrap();
        assert_eq!(stmt.sql, expected);
        assert_eq!(stmt.params, vec![Value::from("Alice"), Value::Bool(true)]);
    }

    #[test]
    fn test_insert_keeps_explicit_primary_key() {
        let table = users(Dialect::Sqlite);
        let mut record = alice(&table);
        record.set("id", 9).unwrap();
        let stmt = StatementBuilder::new(&table).build(Intent::Insert(&record)).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO users (id, name, active) VALUES (?, ?, ?)");
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_update_binds_primary_key_last() {
        let table = users(Dialect::Postgres);
        let mut record = alice(&table);
        record.set("id", 4).unwrap();
        let stmt = StatementBuilder::new(&table).build(Intent::Update(&record)).unwrap();
        assert_eq!(stmt.sql, "UPDATE users SET name = $1, active = $2 WHERE id = $3");
        assert_eq!(
            stmt.params,
            vec![Value::from("Alice"), Value::Bool(true), Value::Int(4)]
        );
    }

    #[test]
    fn test_update_without_identity_fails() {
        let table = users(Dialect::Sqlite);
        let record = alice(&table);
        assert!(matches!(
            StatementBuilder::new(&table).build(Intent::Update(&record)),
            Err(Error::Validation(_))
        ));
    }

    #[test_case(Dialect::Postgres)]
    #[test_case(Dialect::Sqlite)]
    #[test_case(Dialect::MySql)]
    fn test_empty_predicates_are_rejected(dialect: Dialect) {
        let table = users(dialect);
        let builder = StatementBuilder::new(&table);
        for intent in [Intent::Delete(&[]), Intent::SelectByPredicate(&[])] {
            let err = builder.build(intent).unwrap_err();
            assert!(
                matches!(err, Error::Validation(ref msg) if msg == "at least one condition required")
            );
        }
    }

    #[test]
    fn test_predicates_keep_caller_order() {
        let table = users(Dialect::Postgres);
        let conditions = [Condition::eq("active", true), Condition::eq("name", "Bob")];
        let stmt = StatementBuilder::new(&table)
            .build(Intent::SelectByPredicate(&conditions))
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, name, active FROM users WHERE active = $1 AND name = $2"
        );
        assert_eq!(stmt.params, vec![Value::Bool(true), Value::from("Bob")]);
    }

    #[test]
    fn test_null_condition_renders_is_null() {
        let table = users(Dialect::MySql);
        let conditions = [Condition::eq("name", Value::Null), Condition::eq("id", 3)];
        let stmt = StatementBuilder::new(&table)
            .build(Intent::Delete(&conditions))
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM users WHERE name IS NULL AND id = %s");
        assert_eq!(stmt.params, vec![Value::Int(3)]);
    }

    #[test]
    fn test_unknown_condition_column_fails() {
        let table = users(Dialect::Sqlite);
        let conditions = [Condition::eq("email", "x")];
        assert!(matches!(
            StatementBuilder::new(&table).build(Intent::SelectByPredicate(&conditions)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_select_by_id_lists_columns() {
        let table = users(Dialect::Sqlite);
        let stmt = StatementBuilder::new(&table)
            .build(Intent::SelectById(&Value::Int(1)))
            .unwrap();
        assert_eq!(stmt.sql, "SELECT id, name, active FROM users WHERE id = ?");
        assert!(matches!(
            StatementBuilder::new(&table).build(Intent::SelectById(&Value::Null)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_json_is_serialised_where_not_bound_natively() {
        let table = Table::new(
            "docs",
            Dialect::Sqlite,
            vec![ColumnSpec::new("body", ColumnType::Json).unwrap()],
        )
        .unwrap();
        let mut record = table.new_record();
        record.set("body", json!({"a": 1})).unwrap();
        let stmt = StatementBuilder::new(&table).build(Intent::Insert(&record)).unwrap();
        assert_eq!(stmt.params, vec![Value::from(r#"{"a":1}"#)]);
    }

    #[test]
    fn test_insert_with_nothing_to_bind_uses_defaults() {
        let table = Table::new(
            "counters",
            Dialect::MySql,
            vec![ColumnSpec::new("id", ColumnType::Serial).unwrap().primary_key()],
        )
        .unwrap();
        let record = table.new_record();
        let stmt = StatementBuilder::new(&table).build(Intent::Insert(&record)).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO counters () VALUES ()");
    }

    #[test]
    fn test_record_from_other_table_is_rejected() {
        let table = users(Dialect::Sqlite);
        let other = users(Dialect::Sqlite);
        let record = alice(&other);
        assert!(matches!(
            StatementBuilder::new(&table).build(Intent::Insert(&record)),
            Err(Error::Validation(_))
        ));
    }
}
