//! # QuerySmith
//!
//! Dialect-agnostic data access: define a table once, in an abstract column
//! model, and persist or query it against PostgreSQL, MySQL or `SQLite`
//! through one CRUD and schema API.
//!
//! ## Features
//!
//! - One abstract column model mapped onto each dialect's native types
//! - CREATE / additive ALTER DDL generation with foreign-key resolution
//! - Parameterised CRUD statements in each dialect's placeholder convention
//! - A single reusable connection per model with bounded reconnect retries
//! - A TTL cache for read-only queries, shareable across models and threads
//!
//! ## Example
//!
//! ```rust,ignore
//! use querysmith::{ColumnSpec, ColumnType, Dialect, Model, Table, Value};
//! use querysmith::storage::SqliteConnector;
//!
//! let users = Table::new("users", Dialect::Sqlite, vec![
//!     ColumnSpec::new("id", ColumnType::Integer)?.primary_key(),
//!     ColumnSpec::new("name", ColumnType::Text)?,
//!     ColumnSpec::new("active", ColumnType::Boolean)?,
//! ])?;
//!
//! let mut model = Model::new(users, SqliteConnector::new("app.db"));
//! model.set("name", "Alice")?;
//! model.set("active", true)?;
//! let id = model.save()?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cache;
pub mod cli;
pub mod config;
pub mod model;
pub mod models;
pub mod observability;
pub mod schema;
pub mod statement;
pub mod storage;

// Re-exports for convenience
pub use cache::QueryCache;
pub use config::{CacheSettings, ConnectionConfig, QuerySmithConfig, RetrySettings};
pub use model::Model;
pub use models::{ColumnSpec, ColumnType, Dialect, Record, Table, Value};
pub use schema::{SchemaBuilder, TypeMapper};
pub use statement::{Condition, Intent, Statement, StatementBuilder};
pub use storage::{CancellationToken, ConnectionManager, ConnectionState, FetchMode};

/// Error type for querysmith operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When | Retried |
/// |---------|-------------|---------|
/// | `Configuration` | Bad column type, length or dialect at construction time | never |
/// | `Schema` | Invalid reference graph (no primary key on the referenced table) | never |
/// | `Validation` | Missing predicate, identity value or unknown column | never |
/// | `Connection` | Reconnect attempts exhausted, second transport failure | already was |
/// | `Query` | The backend rejected a statement (constraint, syntax) | never |
/// | `Decode` | A returned row does not match the table's column list | never |
/// | `OperationFailed` | Local I/O, runtime construction, lock timeouts | never |
/// | `Cancelled` | The manager's cancellation token fired | never |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid column type, length, identifier or dialect.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid schema graph.
    ///
    /// Raised when:
    /// - A referenced table has no primary-key column
    /// - A referenced table belongs to another dialect or was dropped
    /// - A table definition references a table declared later in the file
    #[error("schema error: {0}")]
    Schema(String),

    /// A statement could not be built from the supplied values.
    ///
    /// Raised when:
    /// - A predicate-based SELECT or DELETE has no conditions
    /// - UPDATE/DELETE/load-by-id is called without a primary key or its value
    /// - A condition or value names a column the table does not declare
    #[error("validation error: {0}")]
    Validation(String),

    /// The connection could not be (re-)established.
    #[error("connection error during '{operation}': {cause}")]
    Connection {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The backend rejected a statement.
    #[error("query '{operation}' failed: {cause}")]
    Query {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A row could not be mapped onto the table's columns.
    #[error("decode error: {0}")]
    Decode(String),

    /// A local operation failed.
    ///
    /// Raised when:
    /// - Migration directories or files cannot be written
    /// - The driver runtime cannot be created
    /// - Configuration files cannot be read or parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The operation was cancelled by its caller.
    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Returns `true` for failures of the transport class.
    ///
    /// Only connection failures are retryable; everything else propagates
    /// to the caller immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Result type alias for querysmith operations.
pub type Result<T> = std::result::Result<T, Error>;
