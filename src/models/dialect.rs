//! Backend dialects and their capability table.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One of the three supported SQL backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL (relational server, numbered placeholders).
    Postgres,
    /// MySQL / `MariaDB` (relational server, format placeholders).
    MySql,
    /// `SQLite` (embedded file, question-mark placeholders).
    Sqlite,
}

/// Parameter placeholder convention of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1, $2, ...`
    Numbered,
    /// `?, ?, ...`
    Question,
    /// `%s, %s, ...`
    Format,
}

impl PlaceholderStyle {
    /// Renders the placeholder for the 1-based parameter `index`.
    #[must_use]
    pub fn render(self, index: usize) -> String {
        match self {
            Self::Numbered => format!("${index}"),
            Self::Question => "?".to_string(),
            Self::Format => "%s".to_string(),
        }
    }
}

impl Dialect {
    /// Returns all supported dialects.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Postgres, Self::MySql, Self::Sqlite]
    }

    /// Returns the canonical dialect name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgresql",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a dialect name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for unknown dialect names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(Error::Configuration(format!(
                "unsupported database dialect: '{other}'"
            ))),
        }
    }

    /// Placeholder convention used by this dialect's driver.
    #[must_use]
    pub const fn placeholder_style(&self) -> PlaceholderStyle {
        match self {
            Self::Postgres => PlaceholderStyle::Numbered,
            Self::MySql => PlaceholderStyle::Format,
            Self::Sqlite => PlaceholderStyle::Question,
        }
    }

    /// Whether INSERT can hand back the generated identity with `RETURNING`.
    #[must_use]
    pub const fn supports_returning(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Whether the backend binds JSON values natively.
    ///
    /// Dialects without a JSON binding receive serialised text.
    #[must_use]
    pub const fn binds_json_natively(&self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Whether the backend stores booleans as 0/1 integers.
    #[must_use]
    pub const fn stores_bool_as_integer(&self) -> bool {
        matches!(self, Self::Sqlite | Self::MySql)
    }

    /// Statement that opens a transaction.
    #[must_use]
    pub const fn begin_statement(&self) -> &'static str {
        match self {
            Self::Postgres | Self::Sqlite => "BEGIN",
            Self::MySql => "START TRANSACTION",
        }
    }

    /// Directory name that holds this dialect's migration records.
    #[must_use]
    pub const fn migrations_dir_name(&self) -> &'static str {
        match self {
            Self::Postgres => "migrations_postgresql",
            Self::MySql => "migrations_mysql",
            Self::Sqlite => "migrations_sqlite",
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
