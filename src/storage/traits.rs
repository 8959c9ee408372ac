//! Driver capability interface.
//!
//! Each dialect adapter implements exactly two things: opening a
//! connection and executing one statement on it. Retry policy, schema
//! handling and result decoding live above this seam.

use crate::models::{Dialect, Value};
use thiserror::Error as ThisError;

/// How much of a statement's result set to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Execute only; no rows are read.
    None,
    /// Read at most one row.
    One,
    /// Read every row.
    All,
}

/// What a driver returns for one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Fetched rows, each in select-list order.
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a write, when the driver reports it.
    pub rows_affected: u64,
    /// Identity assigned by the last INSERT, when the driver reports it.
    pub last_insert_id: Option<i64>,
}

impl QueryOutput {
    /// Output of a statement that returned rows.
    #[must_use]
    pub fn with_rows(rows: Vec<Vec<Value>>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// First row, if any.
    #[must_use]
    pub fn first_row(&self) -> Option<&[Value]> {
        self.rows.first().map(Vec::as_slice)
    }
}

/// A driver failure, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum DriverError {
    /// The session is unusable: refused, reset, closed or timed out.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend rejected the statement; the session is still healthy.
    #[error("statement rejected: {0}")]
    Statement(String),
}

impl DriverError {
    /// Returns `true` for transport failures.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// One live backend session.
///
/// Not shared between threads; the owning manager serialises access.
pub trait Connection: Send {
    /// Executes `sql` with positional `params` already in the dialect's
    /// placeholder convention.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Statement`] when the backend rejects the
    /// statement and [`DriverError::Transport`] when the session failed.
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> Result<QueryOutput, DriverError>;

    /// Whether the session still looks usable without a round trip.
    fn is_alive(&self) -> bool {
        true
    }

    /// Releases the session.
    fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Opens sessions against one configured backend.
pub trait Connector: Send + Sync {
    /// The session type this connector produces.
    type Connection: Connection;

    /// Dialect of the backend.
    fn dialect(&self) -> Dialect;

    /// Human-readable target for diagnostics; never contains secrets.
    fn describe(&self) -> String;

    /// Opens one session.
    ///
    /// # Errors
    ///
    /// Returns a [`DriverError`] if the backend cannot be reached or
    /// refuses the session.
    fn connect(&self) -> Result<Self::Connection, DriverError>;
}
