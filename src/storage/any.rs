//! Runtime-selected adapter.
//!
//! [`AnyConnector`] lets callers that only know the dialect at run time
//! (the CLI, configuration-driven services) hold a single connector type.

use super::sqlite::{SqliteConnection, SqliteConnector};
use super::traits::{Connection, Connector, DriverError, FetchMode, QueryOutput};
use crate::config::ConnectionConfig;
use crate::models::{Dialect, Value};
use crate::{Error, Result};

#[cfg(feature = "mysql")]
use super::mysql::{MySqlConnection, MySqlConnector};
#[cfg(feature = "postgres")]
use super::postgresql::{PgConnection, PgConnector};

/// A connector for whichever backend the configuration names.
#[derive(Debug, Clone)]
pub enum AnyConnector {
    /// Embedded database.
    Sqlite(SqliteConnector),
    /// PostgreSQL server.
    #[cfg(feature = "postgres")]
    Postgres(PgConnector),
    /// MySQL server.
    #[cfg(feature = "mysql")]
    MySql(MySqlConnector),
}

impl AnyConnector {
    /// Builds the connector described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the dialect's adapter was not
    /// compiled in.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        match config {
            ConnectionConfig::Sqlite { path, .. } => Ok(Self::Sqlite(SqliteConnector::new(path))),
            #[cfg(feature = "postgres")]
            ConnectionConfig::Postgres(server) => Ok(Self::Postgres(PgConnector::new(server.clone()))),
            #[cfg(feature = "mysql")]
            ConnectionConfig::MySql(server) => Ok(Self::MySql(MySqlConnector::new(server.clone()))),
            #[allow(unreachable_patterns)]
            other => Err(Error::Configuration(format!(
                "dialect '{}' requires the '{}' feature",
                other.dialect().as_str(),
                feature_name(other.dialect())
            ))),
        }
    }
}

const fn feature_name(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => "postgres",
        Dialect::MySql => "mysql",
        Dialect::Sqlite => "sqlite",
    }
}

impl Connector for AnyConnector {
    type Connection = AnyConnection;

    fn dialect(&self) -> Dialect {
        match self {
            Self::Sqlite(c) => c.dialect(),
            #[cfg(feature = "postgres")]
            Self::Postgres(c) => c.dialect(),
            #[cfg(feature = "mysql")]
            Self::MySql(c) => c.dialect(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Sqlite(c) => c.describe(),
            #[cfg(feature = "postgres")]
            Self::Postgres(c) => c.describe(),
            #[cfg(feature = "mysql")]
            Self::MySql(c) => c.describe(),
        }
    }

    fn connect(&self) -> std::result::Result<AnyConnection, DriverError> {
        match self {
            Self::Sqlite(c) => c.connect().map(AnyConnection::Sqlite),
            #[cfg(feature = "postgres")]
            Self::Postgres(c) => c.connect().map(AnyConnection::Postgres),
            #[cfg(feature = "mysql")]
            Self::MySql(c) => c.connect().map(AnyConnection::MySql),
        }
    }
}

/// A session opened by an [`AnyConnector`].
pub enum AnyConnection {
    /// Embedded database session.
    Sqlite(SqliteConnection),
    /// PostgreSQL session.
    #[cfg(feature = "postgres")]
    Postgres(PgConnection),
    /// MySQL session.
    #[cfg(feature = "mysql")]
    MySql(MySqlConnection),
}

impl Connection for AnyConnection {
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> std::result::Result<QueryOutput, DriverError> {
        match self {
            Self::Sqlite(c) => c.execute(sql, params, mode),
            #[cfg(feature = "postgres")]
            Self::Postgres(c) => c.execute(sql, params, mode),
            #[cfg(feature = "mysql")]
            Self::MySql(c) => c.execute(sql, params, mode),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::Sqlite(c) => c.is_alive(),
            #[cfg(feature = "postgres")]
            Self::Postgres(c) => c.is_alive(),
            #[cfg(feature = "mysql")]
            Self::MySql(c) => c.is_alive(),
        }
    }

    fn close(self) {
        match self {
            Self::Sqlite(c) => c.close(),
            #[cfg(feature = "postgres")]
            Self::Postgres(c) => c.close(),
            #[cfg(feature = "mysql")]
            Self::MySql(c) => c.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    #[test]
    fn test_sqlite_config_builds_sqlite_connector() {
        let connector = AnyConnector::from_config(&ConnectionConfig::sqlite(":memory:")).unwrap();
        assert_eq!(connector.dialect(), Dialect::Sqlite);
        assert_eq!(connector.describe(), "sqlite::memory:");
        let mut conn = connector.connect().unwrap();
        let out = conn.execute("SELECT 1", &[], FetchMode::One).unwrap();
        assert_eq!(out.rows, vec![vec![Value::Int(1)]]);
        conn.close();
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_server_config_selects_dialect() {
        let server = ServerConfig::new("localhost", 5432, "app", "db");
        let connector = AnyConnector::from_config(&ConnectionConfig::Postgres(server)).unwrap();
        assert_eq!(connector.dialect(), Dialect::Postgres);
    }

    #[cfg(not(feature = "mysql"))]
    #[test]
    fn test_missing_feature_is_configuration_error() {
        let server = ServerConfig::new("localhost", 3306, "app", "db");
        let err = AnyConnector::from_config(&ConnectionConfig::MySql(server)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
