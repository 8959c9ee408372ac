//! Schema synchronisation.
//!
//! Brings a live table in line with its definition, additively: a missing
//! table is created, missing columns are added, and nothing is ever
//! dropped or retyped.

use super::migrations::{MigrationKind, MigrationWriter};
use super::SchemaBuilder;
use crate::models::{Dialect, Table, Value};
use crate::storage::{ConnectionManager, Connector, FetchMode};
use crate::{Error, Result};
use std::collections::HashSet;

/// What [`sync_table`] changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The table did not exist and was created.
    Created,
    /// These columns were added, in declaration order.
    Altered(Vec<String>),
    /// Nothing to do.
    UpToDate,
}

/// Whether `table` exists in the connected database.
///
/// # Errors
///
/// Propagates execution errors.
pub fn table_exists<C: Connector>(manager: &mut ConnectionManager<C>, table: &Table) -> Result<bool> {
    let (sql, params) = existence_query(table);
    let output = manager.execute(sql, &params, FetchMode::One)?;
    Ok(!output.rows.is_empty())
}

/// Column names of the live table, as reported by the backend.
///
/// # Errors
///
/// Propagates execution errors; returns [`Error::Decode`] if the backend
/// reports a column name that is not text.
pub fn live_columns<C: Connector>(
    manager: &mut ConnectionManager<C>,
    table: &Table,
) -> Result<Vec<String>> {
    let (sql, params, index) = columns_query(table);
    let output = manager.execute(&sql, &params, FetchMode::All)?;
    output
        .rows
        .into_iter()
        .map(|row| match row.into_iter().nth(index) {
            Some(Value::Text(name)) => Ok(name),
            Some(Value::Blob(bytes)) => String::from_utf8(bytes)
                .map_err(|e| Error::Decode(format!("column name is not UTF-8: {e}"))),
            other => Err(Error::Decode(format!(
                "unexpected column name in introspection row: {other:?}"
            ))),
        })
        .collect()
}

/// Creates or extends `table` and records each executed change.
///
/// The CREATE statement is built before any I/O, so an invalid reference
/// graph fails without touching the database. A migration record is
/// written only after its statement succeeded; failing to write it is
/// logged, not returned.
///
/// # Errors
///
/// Returns [`Error::Schema`] or [`Error::Configuration`] for an invalid
/// definition and propagates execution errors.
pub fn sync_table<C: Connector>(
    manager: &mut ConnectionManager<C>,
    table: &Table,
    migrations: &MigrationWriter,
) -> Result<SyncOutcome> {
    let create = SchemaBuilder::build_create_statement(table)?;
    let dialect = table.dialect();

    if !table_exists(manager, table)? {
        manager.execute(&create, &[], FetchMode::None)?;
        tracing::info!(table = table.name(), dialect = dialect.as_str(), "Created table");
        write_record(migrations, dialect, MigrationKind::Create, table.name(), &create);
        return Ok(SyncOutcome::Created);
    }

    let live: HashSet<String> = live_columns(manager, table)?
        .into_iter()
        .map(|name| name.to_lowercase())
        .collect();

    let mut added = Vec::new();
    for column in table.columns() {
        if live.contains(&column.name().to_lowercase()) {
            continue;
        }
        let alter = SchemaBuilder::build_alter_add_column(table, column)?;
        manager.execute(&alter, &[], FetchMode::None)?;
        tracing::info!(
            table = table.name(),
            column = column.name(),
            dialect = dialect.as_str(),
            "Added column"
        );
        write_record(migrations, dialect, MigrationKind::Alter, table.name(), &alter);
        added.push(column.name().to_string());
    }

    if added.is_empty() {
        Ok(SyncOutcome::UpToDate)
    } else {
        Ok(SyncOutcome::Altered(added))
    }
}

fn write_record(
    migrations: &MigrationWriter,
    dialect: Dialect,
    kind: MigrationKind,
    table: &str,
    sql: &str,
) {
    if let Err(e) = migrations.record(dialect, kind, table, sql) {
        tracing::warn!(table, kind = kind.as_str(), error = %e, "Failed to write migration record");
    }
}

/// Catalogue lookup for one table. PostgreSQL folds unquoted identifiers
/// to lower case, so the name is matched lower-cased there.
fn existence_query(table: &Table) -> (&'static str, Vec<Value>) {
    match table.dialect() {
        Dialect::Postgres => (
            "SELECT table_name::text FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1",
            vec![Value::Text(table.name().to_lowercase())],
        ),
        Dialect::MySql => (
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = %s",
            vec![Value::from(table.name())],
        ),
        Dialect::Sqlite => (
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
            vec![Value::from(table.name())],
        ),
    }
}

/// Column introspection: statement, parameters, and the index of the
/// column-name field in each returned row.
fn columns_query(table: &Table) -> (String, Vec<Value>, usize) {
    match table.dialect() {
        Dialect::Postgres => (
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1"
                .to_string(),
            vec![Value::Text(table.name().to_lowercase())],
            0,
        ),
        Dialect::MySql => (
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = %s"
                .to_string(),
            vec![Value::from(table.name())],
            0,
        ),
        // The name is a validated identifier, so interpolation is safe.
        Dialect::Sqlite => (format!("PRAGMA table_info({})", table.name()), Vec::new(), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ColumnSpec, ColumnType};

    #[test]
    fn test_introspection_queries_follow_dialect_placeholders() {
        for dialect in Dialect::all() {
            let table = Table::new(
                "Users",
                *dialect,
                vec![ColumnSpec::new("id", ColumnType::Integer).unwrap()],
            )
            .unwrap();
            let (exists, params) = existence_query(&table);
            let (columns, column_params, index) = columns_query(&table);
            match dialect {
                Dialect::Postgres => {
                    assert!(exists.ends_with("$1"));
                    assert_eq!(params, vec![Value::from("users")]);
                    assert_eq!(column_params, vec![Value::from("users")]);
                    assert_eq!(index, 0);
                },
                Dialect::MySql => {
                    assert!(exists.ends_with("%s"));
                    assert!(columns.ends_with("%s"));
                    assert_eq!(params, vec![Value::from("Users")]);
                },
                Dialect::Sqlite => {
                    assert!(exists.contains("name = ?"));
                    assert_eq!(columns, "PRAGMA table_info(Users)");
                    assert!(column_params.is_empty());
                    assert_eq!(index, 1);
                },
            }
        }
    }
}
