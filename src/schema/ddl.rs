//! CREATE TABLE / ALTER TABLE generation.

use super::TypeMapper;
use crate::models::{ColumnSpec, Table};
use crate::{Error, Result};
use std::fmt::Write as _;

/// Produces DDL text for a [`Table`]. Performs no I/O.
pub struct SchemaBuilder;

impl SchemaBuilder {
    /// Builds the `CREATE TABLE` statement for `table`.
    ///
    /// Columns are emitted in declaration order, followed by one
    /// `FOREIGN KEY` clause per referencing column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if a referenced table has no primary key,
    /// belongs to another dialect, or has been dropped, and
    /// [`Error::Configuration`] if a column type cannot be rendered.
    pub fn build_create_statement(table: &Table) -> Result<String> {
        let mut definitions = Vec::with_capacity(table.columns().len());
        let mut foreign_keys = Vec::new();

        for column in table.columns() {
            let mut definition = format!(
                "{} {}",
                column.name(),
                TypeMapper::map_column(column, table.dialect())?
            );
            if column.is_primary_key() {
                definition.push_str(" PRIMARY KEY");
            }
            if column.is_unique() {
                definition.push_str(" UNIQUE");
            }
            if column.is_not_null() {
                definition.push_str(" NOT NULL");
            }
            definitions.push(definition);

            if let Some((target, pk)) = Self::resolve_reference(table, column)? {
                foreign_keys.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {target}({pk})",
                    column.name()
                ));
            }
        }

        definitions.extend(foreign_keys);

        let mut ddl = format!("CREATE TABLE {} (\n", table.name());
        for (i, definition) in definitions.iter().enumerate() {
            let separator = if i + 1 < definitions.len() { "," } else { "" };
            let _ = writeln!(ddl, "    {definition}{separator}");
        }
        ddl.push_str(");");
        Ok(ddl)
    }

    /// Builds an `ALTER TABLE ... ADD COLUMN` statement.
    ///
    /// Only the column type is rendered: constraints cannot be added to
    /// populated tables portably.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `column` is not part of `table`, or
    /// [`Error::Configuration`] if its type cannot be rendered.
    pub fn build_alter_add_column(table: &Table, column: &ColumnSpec) -> Result<String> {
        if table.column(column.name()).is_none() {
            return Err(Error::Validation(format!(
                "table '{}' has no column '{}'",
                table.name(),
                column.name()
            )));
        }
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {} {};",
            table.name(),
            column.name(),
            TypeMapper::map_column(column, table.dialect())?
        ))
    }

    /// Resolves a column's foreign-key target to `(table, primary key)`.
    fn resolve_reference(table: &Table, column: &ColumnSpec) -> Result<Option<(String, String)>> {
        let Some(target) = column.referenced_table() else {
            return Ok(None);
        };
        let target = target.ok_or_else(|| {
            Error::Schema(format!(
                "column '{}.{}' references a table that has been dropped",
                table.name(),
                column.name()
            ))
        })?;

        if target.dialect() != table.dialect() {
            return Err(Error::Schema(format!(
                "column '{}.{}' references '{}' of dialect {}, expected {}",
                table.name(),
                column.name(),
                target.name(),
                target.dialect(),
                table.dialect()
            )));
        }

        let pk = target.primary_key().ok_or_else(|| {
            Error::Schema(format!(
                "reference table has no primary key: '{}' (referenced by '{}.{}')",
                target.name(),
                table.name(),
                column.name()
            ))
        })?;

        Ok(Some((target.name().to_string(), pk.name().to_string())))
    }
}
