//! Storage layer.
//!
//! Two layers sit here:
//! - **Adapters**: one per dialect, implementing the [`Connector`] /
//!   [`Connection`] capability pair (`SQLite` always, PostgreSQL and MySQL
//!   behind their Cargo features)
//! - **Management**: [`ConnectionManager`] owns a session, applies the
//!   retry policy and tracks transactions; [`ResultDecoder`] maps raw rows
//!   back onto a table's columns

// Allow significant_drop_tightening - sessions are held for the whole call.
#![allow(clippy::significant_drop_tightening)]
// Allow match_same_arms for explicit per-dialect dispatch.
#![allow(clippy::match_same_arms)]

pub mod any;
mod cancel;
pub mod decode;
pub mod manager;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgresql;
pub mod sqlite;
pub mod traits;

pub use any::{AnyConnection, AnyConnector};
pub use decode::ResultDecoder;
pub use manager::{ConnectionManager, ConnectionState};
#[cfg(feature = "mysql")]
pub use mysql::{MySqlConnection, MySqlConnector};
#[cfg(feature = "postgres")]
pub use postgresql::{PgConnection, PgConnector};
pub use sqlite::{SqliteConnection, SqliteConnector};
pub use tokio_util::sync::CancellationToken;
pub use traits::{Connection, Connector, DriverError, FetchMode, QueryOutput};
