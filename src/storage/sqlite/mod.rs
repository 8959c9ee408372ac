//! `SQLite` adapter for the embedded dialect.
//!
//! ## Module Structure
//!
//! - [`connection`]: opening, pragma configuration and error classification
//! - [`value`]: [`Value`](crate::models::Value) to storage-class conversion

mod connection;
mod value;

pub use connection::{MEMORY_PATH, classify_error, configure_connection};
pub use value::from_value_ref;

use super::traits::{Connection, Connector, DriverError, FetchMode, QueryOutput};
use crate::models::{Dialect, Value};
use std::path::{Path, PathBuf};

/// Opens sessions on one database file.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    /// Connector for the database file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Connector for private in-memory databases.
    ///
    /// Every session starts with an empty database, so data does not
    /// survive a reconnect.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for SqliteConnector {
    type Connection = SqliteConnection;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    fn connect(&self) -> Result<SqliteConnection, DriverError> {
        connection::open(&self.path).map(|conn| SqliteConnection { conn })
    }
}

/// One open database handle.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    fn query(
        &self,
        sql: &str,
        params: &[Value],
        limit: Option<usize>,
    ) -> Result<QueryOutput, DriverError> {
        let mut stmt = self.conn.prepare(sql).map_err(classify_error)?;
        let width = stmt.column_count();
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params))
            .map_err(classify_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(classify_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i).map_err(classify_error)?));
            }
            out.push(values);
            if limit.is_some_and(|limit| out.len() >= limit) {
                break;
            }
        }
        Ok(QueryOutput::with_rows(out))
    }
}

impl Connection for SqliteConnection {
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> Result<QueryOutput, DriverError> {
        match mode {
            FetchMode::One => self.query(sql, params, Some(1)),
            FetchMode::All => self.query(sql, params, None),
            FetchMode::None => {
                let mut stmt = self.conn.prepare(sql).map_err(classify_error)?;
                if stmt.column_count() > 0 {
                    // Row-returning statements (PRAGMA, RETURNING) are drained.
                    drop(stmt);
                    return self.query(sql, params, None).map(|out| QueryOutput {
                        rows: Vec::new(),
                        ..out
                    });
                }
                let affected = stmt
                    .execute(rusqlite::params_from_iter(params))
                    .map_err(classify_error)?;
                Ok(QueryOutput {
                    rows: Vec::new(),
                    rows_affected: affected as u64,
                    last_insert_id: Some(self.conn.last_insert_rowid()),
                })
            },
        }
    }

    fn close(self) {
        if let Err((_, e)) = self.conn.close() {
            tracing::debug!(error = %e, "SQLite close reported an error");
        }
    }
}
