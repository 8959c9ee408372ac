//! Migration records.
//!
//! Every schema change the sync policy executes is persisted as one SQL
//! file under `<base_dir>/migrations_<dialect>/`, named
//! `<kind>_<table>_<UTC timestamp>.sql`. Files are created exclusively: an
//! existing file of the same name is left untouched.

use crate::config::MigrationSettings;
use crate::models::Dialect;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Kind of schema change recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationKind {
    /// `CREATE TABLE`.
    Create,
    /// `ALTER TABLE ... ADD COLUMN`.
    Alter,
}

impl MigrationKind {
    /// Returns the file name prefix.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Alter => "alter",
        }
    }
}

/// Writes migration record files.
#[derive(Debug, Clone, Default)]
pub struct MigrationWriter {
    settings: MigrationSettings,
}

impl MigrationWriter {
    /// Creates a writer from settings.
    #[must_use]
    pub const fn new(settings: MigrationSettings) -> Self {
        Self { settings }
    }

    /// A writer that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(MigrationSettings::disabled())
    }

    /// Whether records are written.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Directory holding `dialect`'s records.
    #[must_use]
    pub fn directory(&self, dialect: Dialect) -> PathBuf {
        self.settings.base_dir.join(dialect.migrations_dir_name())
    }

    /// File name of a record taken at `at`.
    #[must_use]
    pub fn file_name(kind: MigrationKind, table: &str, at: DateTime<Utc>) -> String {
        format!("{}_{table}_{}.sql", kind.as_str(), at.format("%Y%m%d%H%M%S%6f"))
    }

    /// Records `sql` as executed now.
    ///
    /// Returns the path written, or `None` when disabled or a record of the
    /// same name already exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the directory or file cannot
    /// be written.
    pub fn record(
        &self,
        dialect: Dialect,
        kind: MigrationKind,
        table: &str,
        sql: &str,
    ) -> Result<Option<PathBuf>> {
        self.record_at(dialect, kind, table, sql, Utc::now())
    }

    /// Records `sql` with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Same as [`MigrationWriter::record`].
    pub fn record_at(
        &self,
        dialect: Dialect,
        kind: MigrationKind,
        table: &str,
        sql: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<PathBuf>> {
        if !self.settings.enabled {
            return Ok(None);
        }

        let dir = self.directory(dialect);
        std::fs::create_dir_all(&dir).map_err(|e| Error::OperationFailed {
            operation: "create_migrations_dir".to_string(),
            cause: format!("{}: {e}", dir.display()),
        })?;

        let path = dir.join(Self::file_name(kind, table, at));
        let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "Migration record already exists");
                return Ok(None);
            },
            Err(e) => {
                return Err(Error::OperationFailed {
                    operation: "write_migration".to_string(),
                    cause: format!("{}: {e}", path.display()),
                });
            },
        };

        write_or_remove(&path, file, sql)?;

        tracing::info!(
            path = %path.display(),
            table,
            kind = kind.as_str(),
            "Wrote migration record"
        );
        Ok(Some(path))
    }
}

/// Writes `sql` to the freshly created record at `path`. A partial record
/// is removed so a later attempt can create it again.
fn write_or_remove(path: &Path, mut out: impl Write, sql: &str) -> Result<()> {
    let Err(e) = writeln!(out, "{sql}").and_then(|()| out.flush()) else {
        return Ok(());
    };
    drop(out);
    if let Err(remove_err) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %remove_err,
            "Failed to remove partial migration record"
        );
    }
    Err(Error::OperationFailed {
        operation: "write_migration".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}
