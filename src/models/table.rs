//! Table definitions and row records.

use super::column::validate_identifier;
use super::{ColumnSpec, Dialect, Value};
use crate::schema::TypeMapper;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// An ordered list of columns bound to a table name and a dialect.
///
/// Column order is significant: it is the order of the DDL, of INSERT
/// column lists and of positional result decoding.
#[derive(Debug)]
pub struct Table {
    name: String,
    dialect: Dialect,
    columns: Vec<ColumnSpec>,
    primary_key: Option<usize>,
}

impl Table {
    /// Builds and validates a table definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the table name is invalid, there
    /// are no columns, column names repeat, more than one column is marked as
    /// primary key, or a column type is not supported by `dialect`.
    pub fn new(
        name: impl Into<String>,
        dialect: Dialect,
        columns: Vec<ColumnSpec>,
    ) -> Result<Arc<Self>> {
        let name = name.into();
        validate_identifier(&name, "table")?;

        if columns.is_empty() {
            return Err(Error::Configuration(format!(
                "table '{name}' must declare at least one column"
            )));
        }

        let mut seen = HashSet::new();
        let mut primary_key = None;
        for (index, column) in columns.iter().enumerate() {
            if !seen.insert(column.name().to_lowercase()) {
                return Err(Error::Configuration(format!(
                    "table '{name}' declares column '{}' more than once",
                    column.name()
                )));
            }
            if column.is_primary_key() {
                if let Some(existing) = primary_key {
                    let existing: &ColumnSpec = &columns[existing];
                    return Err(Error::Configuration(format!(
                        "table '{name}' has more than one primary key ('{}' and '{}')",
                        existing.name(),
                        column.name()
                    )));
                }
                primary_key = Some(index);
            }
            TypeMapper::map_column(column, dialect)?;
        }

        Ok(Arc::new(Self {
            name,
            dialect,
            columns,
            primary_key,
        }))
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Looks up a column by name (case-insensitive).
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    /// Position of a column (case-insensitive).
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// The identity column, if one is marked.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnSpec> {
        self.primary_key.map(|i| &self.columns[i])
    }

    /// Position of the identity column.
    #[must_use]
    pub const fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
    }

    /// Creates an empty record (every value `NULL`) for this table.
    #[must_use]
    pub fn new_record(self: &Arc<Self>) -> Record {
        Record::new(Arc::clone(self))
    }
}

/// The live values of one row, aligned with its table's columns.
#[derive(Debug, Clone)]
pub struct Record {
    table: Arc<Table>,
    values: Vec<Value>,
}

impl Record {
    /// Creates a record with every value `NULL`.
    #[must_use]
    pub fn new(table: Arc<Table>) -> Self {
        let values = vec![Value::Null; table.columns().len()];
        Self { table, values }
    }

    /// Creates a record from values in column order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the number of values differs from the
    /// number of columns.
    pub fn from_values(table: Arc<Table>, values: Vec<Value>) -> Result<Self> {
        if values.len() != table.columns().len() {
            return Err(Error::Decode(format!(
                "row for '{}' has {} values, table declares {} columns",
                table.name(),
                values.len(),
                table.columns().len()
            )));
        }
        Ok(Self { table, values })
    }

    /// The table this record belongs to.
    #[must_use]
    pub const fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// Returns a column's current value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.table.column_index(column).map(|i| &self.values[i])
    }

    /// Sets a column's value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the table has no such column.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.table.column_index(column).ok_or_else(|| {
            Error::Validation(format!(
                "table '{}' has no column '{column}'",
                self.table.name()
            ))
        })?;
        self.values[index] = value.into();
        Ok(())
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Iterates over `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnSpec, &Value)> {
        self.table.columns().iter().zip(self.values.iter())
    }

    /// The identity value, if the table has a primary key.
    #[must_use]
    pub fn primary_key_value(&self) -> Option<&Value> {
        self.table.primary_key_index().map(|i| &self.values[i])
    }

    /// Replaces every value with those of `other`, which must belong to a
    /// table with the same columns.
    pub(crate) fn assign(&mut self, other: Self) {
        self.values = other.values;
    }

    /// Copies the values into a name-keyed map.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.iter()
            .map(|(column, value)| (column.name().to_string(), value.clone()))
            .collect()
    }
}
