//! Declarative table definitions.
//!
//! ```toml
//! [[tables]]
//! name = "users"
//! columns = [
//!   { name = "id", type = "serial", primary_key = true },
//!   { name = "email", type = "varchar", length = 120, unique = true },
//! ]
//!
//! [[tables]]
//! name = "posts"
//! columns = [
//!   { name = "id", type = "serial", primary_key = true },
//!   { name = "author_id", type = "integer", references = "users" },
//! ]
//! ```

use crate::models::{ColumnSpec, ColumnType, Dialect, Table};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A parsed, dialect-independent schema file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDefinition {
    /// Tables in file order.
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// One `[[tables]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnDefinition>,
}

/// One column entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Abstract type name, case-insensitive.
    #[serde(rename = "type")]
    pub column_type: String,
    /// Length for `char` / `varchar`.
    pub length: Option<u32>,
    /// Identity column.
    #[serde(default)]
    pub primary_key: bool,
    /// UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// NOT NULL constraint.
    #[serde(default)]
    pub not_null: bool,
    /// Name of an earlier table whose primary key this column references.
    pub references: Option<String>,
}

impl SchemaDefinition {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the text is not a valid schema
    /// file.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_schema_file".to_string(),
            cause: e.to_string(),
        })
    }

    /// Reads and parses a schema file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the file cannot be read or
    /// parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_schema_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml(&contents)
    }

    /// Builds every table for `dialect`, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for invalid names, types or lengths
    /// and [`Error::Schema`] for a reference to a table not declared
    /// earlier in the file.
    pub fn build(&self, dialect: Dialect) -> Result<Vec<Arc<Table>>> {
        let mut built: Vec<Arc<Table>> = Vec::with_capacity(self.tables.len());
        let mut by_name: HashMap<String, usize> = HashMap::new();

        for definition in &self.tables {
            let mut columns = Vec::with_capacity(definition.columns.len());
            for column in &definition.columns {
                let mut spec = ColumnSpec::with_length(
                    column.name.as_str(),
                    ColumnType::parse(&column.column_type)?,
                    column.length,
                )?;
                if column.primary_key {
                    spec = spec.primary_key();
                }
                if column.unique {
                    spec = spec.unique();
                }
                if column.not_null {
                    spec = spec.not_null();
                }
                if let Some(target) = &column.references {
                    let index = by_name.get(&target.to_lowercase()).ok_or_else(|| {
                        Error::Schema(format!(
                            "column '{}.{}' references '{target}', which is not declared before it",
                            definition.name, column.name
                        ))
                    })?;
                    spec = spec.references(&built[*index]);
                }
                columns.push(spec);
            }

            let table = Table::new(definition.name.as_str(), dialect, columns)?;
            by_name.insert(table.name().to_lowercase(), built.len());
            built.push(table);
        }

        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaBuilder;

    const BLOG: &str = r#"
        [[tables]]
        name = "users"
        columns = [
          { name = "id", type = "serial", primary_key = true },
          { name = "email", type = "VARCHAR", length = 120, unique = true, not_null = true },
        ]

        [[tables]]
        name = "posts"
        columns = [
          { name = "id", type = "serial", primary_key = true },
          { name = "author_id", type = "integer", references = "users" },
          { name = "body", type = "text" },
        ]
    "#;

    #[test]
    fn test_build_keeps_file_order_and_references() {
        let definition = SchemaDefinition::from_toml(BLOG).unwrap();
        let tables = definition.build(Dialect::Postgres).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name(), "users");

        let ddl = SchemaBuilder::build_create_statement(&tables[1]).unwrap();
        assert!(ddl.contains("FOREIGN KEY (author_id) REFERENCES users(id)"));
    }

    #[test]
    fn test_forward_reference_is_schema_error() {
        let definition = SchemaDefinition::from_toml(
            r#"
            [[tables]]
            name = "posts"
            columns = [{ name = "author_id", type = "integer", references = "users" }]
            "#,
        )
        .unwrap();
        assert!(matches!(definition.build(Dialect::Sqlite), Err(Error::Schema(_))));
    }

    #[test]
    fn test_varchar_without_length_is_configuration_error() {
        let definition = SchemaDefinition::from_toml(
            r#"
            [[tables]]
            name = "users"
            columns = [{ name = "email", type = "varchar" }]
            "#,
        )
        .unwrap();
        assert!(matches!(
            definition.build(Dialect::MySql),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = SchemaDefinition::from_toml(
            r#"
            [[tables]]
            name = "users"
            columns = [{ name = "id", type = "integer", primary = true }]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
    }
}
