//! Abstract column model.

use super::Table;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Identifiers are interpolated into SQL text, so they are restricted to a
/// portable, quote-free subset.
static IDENTIFIER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").ok());

/// Validates a table or column name.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if `name` is not a plain identifier.
pub fn validate_identifier(name: &str, what: &str) -> Result<()> {
    if IDENTIFIER.as_ref().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "invalid {what} name '{name}': expected [A-Za-z_][A-Za-z0-9_]*, at most 63 characters"
        )))
    }
}

/// Dialect-independent column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Unbounded text.
    Text,
    /// Fixed-length text; requires a length.
    Char,
    /// Bounded text; requires a length.
    Varchar,
    /// 32-bit integer.
    Integer,
    /// 16-bit integer.
    SmallInt,
    /// 64-bit integer.
    BigInt,
    /// Floating point.
    Real,
    /// Exact numeric.
    Decimal,
    /// Auto-incrementing integer.
    Serial,
    /// Date and time.
    Timestamp,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Time span.
    Interval,
    /// Boolean.
    Boolean,
    /// Binary data.
    Blob,
    /// Binary data (PostgreSQL spelling).
    Bytea,
    /// JSON document.
    Json,
    /// Binary JSON document.
    Jsonb,
}

impl ColumnType {
    /// Returns every abstract type.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Text,
            Self::Char,
            Self::Varchar,
            Self::Integer,
            Self::SmallInt,
            Self::BigInt,
            Self::Real,
            Self::Decimal,
            Self::Serial,
            Self::Timestamp,
            Self::Date,
            Self::Time,
            Self::Interval,
            Self::Boolean,
            Self::Blob,
            Self::Bytea,
            Self::Json,
            Self::Jsonb,
        ]
    }

    /// Returns the abstract type name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Char => "CHAR",
            Self::Varchar => "VARCHAR",
            Self::Integer => "INTEGER",
            Self::SmallInt => "SMALLINT",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Decimal => "DECIMAL",
            Self::Serial => "SERIAL",
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Interval => "INTERVAL",
            Self::Boolean => "BOOLEAN",
            Self::Blob => "BLOB",
            Self::Bytea => "BYTEA",
            Self::Json => "JSON",
            Self::Jsonb => "JSONB",
        }
    }

    /// Parses an abstract type name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        let upper = s.trim().to_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|ty| ty.as_str() == upper)
            .ok_or_else(|| Error::Configuration(format!("unknown column type '{s}'")))
    }

    /// Whether the type must be declared with a length.
    #[must_use]
    pub const fn requires_length(&self) -> bool {
        matches!(self, Self::Char | Self::Varchar)
    }

    /// Whether values are JSON documents.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self, Self::Json | Self::Jsonb)
    }

    /// Whether values are raw bytes.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Blob | Self::Bytea)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Description of one table column.
///
/// Immutable once the owning [`Table`] is built. A reference to another
/// table is held weakly: the column never keeps the referenced definition
/// alive.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    name: String,
    column_type: ColumnType,
    length: Option<u32>,
    primary_key: bool,
    unique: bool,
    not_null: bool,
    references: Option<Weak<Table>>,
}

impl ColumnSpec {
    /// Creates a column of a type that takes no length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is not a valid identifier
    /// or the type requires a length (`CHAR`, `VARCHAR`).
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Result<Self> {
        Self::build(name.into(), column_type, None)
    }

    /// Creates a column of a length-bearing type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name is invalid, the length is
    /// zero, or the type does not take a length.
    pub fn sized(name: impl Into<String>, column_type: ColumnType, length: u32) -> Result<Self> {
        Self::build(name.into(), column_type, Some(length))
    }

    /// Creates a column from an optional length, as read from definitions.
    ///
    /// # Errors
    ///
    /// Same as [`ColumnSpec::new`] and [`ColumnSpec::sized`].
    pub fn with_length(
        name: impl Into<String>,
        column_type: ColumnType,
        length: Option<u32>,
    ) -> Result<Self> {
        Self::build(name.into(), column_type, length)
    }

    fn build(name: String, column_type: ColumnType, length: Option<u32>) -> Result<Self> {
        validate_identifier(&name, "column")?;
        match (column_type.requires_length(), length) {
            (true, None) => {
                return Err(Error::Configuration(format!(
                    "column '{name}': length must be specified for {column_type}"
                )));
            },
            (true, Some(0)) => {
                return Err(Error::Configuration(format!(
                    "column '{name}': length of {column_type} must be positive"
                )));
            },
            (false, Some(_)) => {
                return Err(Error::Configuration(format!(
                    "column '{name}': {column_type} does not take a length"
                )));
            },
            _ => {},
        }

        Ok(Self {
            name,
            column_type,
            length,
            primary_key: false,
            unique: false,
            not_null: false,
            references: None,
        })
    }

    /// Marks the column as the table's primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds a NOT NULL constraint.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Declares a foreign key onto `table`'s primary key.
    #[must_use]
    pub fn references(mut self, table: &Arc<Table>) -> Self {
        self.references = Some(Arc::downgrade(table));
        self
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Abstract column type.
    #[must_use]
    pub const fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Declared length, for `CHAR`/`VARCHAR`.
    #[must_use]
    pub const fn length(&self) -> Option<u32> {
        self.length
    }

    /// Whether this is the primary-key column.
    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Whether the column carries a UNIQUE constraint.
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the column carries a NOT NULL constraint.
    #[must_use]
    pub const fn is_not_null(&self) -> bool {
        self.not_null
    }

    /// Whether the column declares a foreign key.
    #[must_use]
    pub const fn has_reference(&self) -> bool {
        self.references.is_some()
    }

    /// Resolves the referenced table, if the column declares one.
    ///
    /// Returns `Some(None)` when the referenced definition has been dropped.
    #[must_use]
    pub fn referenced_table(&self) -> Option<Option<Arc<Table>>> {
        self.references.as_ref().map(Weak::upgrade)
    }
}
