//! `SQLite` connection setup and error classification.

use crate::storage::DriverError;
use rusqlite::{Connection, ErrorCode};
use std::path::Path;

/// In-memory database path.
pub const MEMORY_PATH: &str = ":memory:";

/// Opens and configures a database file.
///
/// # Errors
///
/// Returns [`DriverError::Transport`] if the file cannot be opened or
/// configured.
pub fn open(path: &Path) -> Result<Connection, DriverError> {
    let conn = if path.as_os_str() == MEMORY_PATH {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .map_err(|e| DriverError::Transport(format!("{}: {e}", path.display())))?;

    configure_connection(&conn)?;
    Ok(conn)
}

/// Configures a `SQLite` connection for concurrent use.
///
/// # Configuration Applied
///
/// - **WAL mode**: concurrent readers with a single writer (file databases only)
/// - **NORMAL synchronous**: balances durability with performance
/// - **`busy_timeout`**: waits up to 5 seconds on lock contention instead of failing
/// - **`foreign_keys`**: enforces declared `FOREIGN KEY` clauses
///
/// # Errors
///
/// Returns [`DriverError::Transport`] if foreign-key enforcement cannot be
/// enabled.
pub fn configure_connection(conn: &Connection) -> Result<(), DriverError> {
    // journal_mode reports the resulting mode as a row, which pragma_update
    // tolerates; in-memory databases stay in "memory" mode.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    let _ = conn.pragma_update(None, "busy_timeout", "5000");
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| DriverError::Transport(format!("enable foreign keys: {e}")))
}

/// Splits driver errors into session failures and rejected statements.
///
/// Lock contention that outlived `busy_timeout`, I/O failures and an
/// unopenable file make the session unusable; everything else (syntax,
/// constraints, type mismatches) is a statement error.
#[allow(clippy::needless_pass_by_value)]
pub fn classify_error(e: rusqlite::Error) -> DriverError {
    let transport = match &e {
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
            failure.code,
            ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::NotADatabase
                | ErrorCode::FileLockingProtocolFailed
        ),
        _ => false,
    };

    if transport {
        DriverError::Transport(e.to_string())
    } else {
        DriverError::Statement(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_connection() {
        let conn = open(Path::new(MEMORY_PATH)).unwrap();

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert!(
            journal_mode.eq_ignore_ascii_case("wal") || journal_mode.eq_ignore_ascii_case("memory"),
            "Expected 'wal' or 'memory' journal mode, got '{journal_mode}'"
        );

        let synchronous: i32 = conn
            .pragma_query_value(None, "synchronous", |row| row.get(0))
            .unwrap();
        assert_eq!(synchronous, 1, "Expected NORMAL synchronous mode (1)");

        let busy_timeout: i32 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(busy_timeout, 5000);

        let foreign_keys: i32 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&dir.path().join("wal.db")).unwrap();
        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_syntax_errors_are_statement_errors() {
        let conn = open(Path::new(MEMORY_PATH)).unwrap();
        let err = conn.execute("SELEC 1", []).unwrap_err();
        assert!(matches!(classify_error(err), DriverError::Statement(_)));
    }

    #[test]
    fn test_constraint_violations_are_statement_errors() {
        let conn = open(Path::new(MEMORY_PATH)).unwrap();
        conn.execute_batch("CREATE TABLE t (a INTEGER UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(matches!(classify_error(err), DriverError::Statement(_)));
    }

    #[test]
    fn test_unopenable_file_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open(&dir.path().join("missing").join("nested").join("x.db")).unwrap_err();
        assert!(err.is_transport());
    }
}
