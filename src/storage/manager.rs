//! Connection lifecycle with bounded reconnect.
//!
//! # State Machine
//!
//! ```text
//! +--------------+   connect()   +------------+   success   +-----------+
//! | Disconnected | ------------> | Connecting | ----------> | Connected |
//! +--------------+               +------------+             +-----------+
//!        ^                             |                          |
//!        |     attempts exhausted      |    transport failure     |
//!        +-----------------------------+--------------------------+
//! ```
//!
//! A failed connect is attempted `max_retries` times in total (at least
//! once) with a fixed delay between attempts. A transport failure during `execute` closes the stale
//! session, reconnects and retries the statement once; a statement the
//! backend rejects is never retried.
//!
//! Each manager cancels through a child of a parent [`CancellationToken`].
//! Cancelling the parent stops every manager sharing it for good; a
//! manager's own handle can be replaced with
//! [`ConnectionManager::reset_cancellation`].

use super::cancel::Backoff;
use super::traits::{Connection, Connector, DriverError, FetchMode, QueryOutput};
use crate::config::RetrySettings;
use crate::models::{Dialect, Value};
use crate::{Error, Result};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a [`ConnectionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session is held.
    Disconnected,
    /// A connect cycle is in progress.
    Connecting,
    /// A session is held and believed healthy.
    Connected,
}

impl ConnectionState {
    /// Returns the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Owns one session for one model instance.
///
/// Not thread-safe: a manager serves one logical session and is driven
/// through `&mut self`.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    retry: RetrySettings,
    connection: Option<C::Connection>,
    state: ConnectionState,
    in_transaction: bool,
    parent: CancellationToken,
    cancel: CancellationToken,
    backoff: Backoff,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a disconnected manager.
    #[must_use]
    pub fn new(connector: C, retry: RetrySettings) -> Self {
        let parent = CancellationToken::new();
        Self {
            connector,
            retry,
            connection: None,
            state: ConnectionState::Disconnected,
            in_transaction: false,
            cancel: parent.child_token(),
            parent,
            backoff: Backoff::default(),
        }
    }

    /// Derives this manager's cancellation from `token`, e.g. to stop
    /// several managers with one call.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token.child_token();
        self.parent = token;
        self
    }

    /// Replaces the retry policy; applies from the next connect.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// A handle to this manager's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replaces a fired token with a fresh child of the parent and returns
    /// the new handle. Handles taken earlier stay cancelled.
    ///
    /// Has no lasting effect once the parent itself has been cancelled.
    pub fn reset_cancellation(&mut self) -> CancellationToken {
        if self.cancel.is_cancelled() {
            self.cancel = self.parent.child_token();
        }
        self.cancel.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Dialect of the underlying connector.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.connector.dialect()
    }

    /// The underlying connector.
    #[must_use]
    pub const fn connector(&self) -> &C {
        &self.connector
    }

    /// Retry settings in effect.
    #[must_use]
    pub const fn retry_settings(&self) -> &RetrySettings {
        &self.retry
    }

    /// Whether a transaction is open on the current session.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Establishes a session. A no-op when already connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] once every attempt has failed, and
    /// [`Error::Cancelled`] if the token fires first. The manager is left
    /// disconnected in both cases.
    pub fn connect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Connected {
            match &self.connection {
                Some(conn) if conn.is_alive() => return Ok(()),
                _ => self.discard_connection(),
            }
        }

        self.ensure_not_cancelled("connect")?;
        self.state = ConnectionState::Connecting;

        let dialect = self.connector.dialect();
        let max_attempts = self.retry.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            metrics::counter!(
                "querysmith_connect_attempts_total",
                "dialect" => dialect.as_str()
            )
            .increment(1);

            match self.connector.connect() {
                Ok(conn) => {
                    self.connection = Some(conn);
                    self.state = ConnectionState::Connected;
                    tracing::debug!(
                        dialect = dialect.as_str(),
                        target_db = %self.connector.describe(),
                        attempt,
                        "Connected"
                    );
                    return Ok(());
                },
                Err(e) => {
                    tracing::warn!(
                        dialect = dialect.as_str(),
                        target_db = %self.connector.describe(),
                        attempt,
                        max_attempts,
                        error = %e,
                        "Connection attempt failed"
                    );
                    last_error = e.to_string();
                },
            }

            if attempt < max_attempts {
                match self.backoff.sleep(&self.cancel, self.retry.retry_delay) {
                    Ok(false) => {},
                    Ok(true) => {
                        self.state = ConnectionState::Disconnected;
                        return Err(Error::Cancelled(
                            "connect interrupted during retry delay".to_string(),
                        ));
                    },
                    Err(e) => {
                        self.state = ConnectionState::Disconnected;
                        return Err(Error::OperationFailed {
                            operation: "connect_backoff".to_string(),
                            cause: e.to_string(),
                        });
                    },
                }
            }
        }

        self.state = ConnectionState::Disconnected;
        Err(Error::Connection {
            operation: "connect".to_string(),
            cause: format!(
                "{} after {max_attempts} attempt(s): {last_error}",
                self.connector.describe()
            ),
        })
    }

    /// Executes one statement, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the backend rejects the statement,
    /// [`Error::Connection`] when the session cannot be (re-)established or
    /// fails twice, and [`Error::Cancelled`] once the token has fired.
    pub fn execute(&mut self, sql: &str, params: &[Value], mode: FetchMode) -> Result<QueryOutput> {
        let operation = statement_kind(sql);
        self.ensure_not_cancelled(&operation)?;
        self.connect()?;

        metrics::counter!(
            "querysmith_statements_total",
            "dialect" => self.connector.dialect().as_str(),
            "operation" => operation.clone()
        )
        .increment(1);
        tracing::debug!(operation = %operation, params = params.len(), "Executing statement");

        match self.run(sql, params, mode) {
            Ok(output) => Ok(output),
            Err(DriverError::Statement(cause)) => Err(Error::Query { operation, cause }),
            Err(DriverError::Transport(cause)) => {
                self.discard_connection();

                if self.in_transaction {
                    self.in_transaction = false;
                    return Err(Error::Connection {
                        operation,
                        cause: format!("transaction aborted by transport failure: {cause}"),
                    });
                }

                tracing::warn!(
                    operation = %operation,
                    error = %cause,
                    "Transport failure, reconnecting and retrying once"
                );
                metrics::counter!(
                    "querysmith_transport_retries_total",
                    "dialect" => self.connector.dialect().as_str()
                )
                .increment(1);

                self.ensure_not_cancelled(&operation)?;
                self.connect()?;
                match self.run(sql, params, mode) {
                    Ok(output) => Ok(output),
                    Err(DriverError::Statement(cause)) => Err(Error::Query { operation, cause }),
                    Err(DriverError::Transport(cause)) => {
                        self.discard_connection();
                        Err(Error::Connection { operation, cause })
                    },
                }
            },
        }
    }

    /// Opens a transaction on the current session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a transaction is already open, or any
    /// [`ConnectionManager::execute`] error.
    pub fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(Error::Validation(
                "a transaction is already open on this connection".to_string(),
            ));
        }
        let begin = self.connector.dialect().begin_statement();
        self.execute(begin, &[], FetchMode::None)?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] without an open transaction, or any
    /// [`ConnectionManager::execute`] error.
    pub fn commit(&mut self) -> Result<()> {
        self.finish_transaction("COMMIT")
    }

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] without an open transaction, or any
    /// [`ConnectionManager::execute`] error.
    pub fn rollback(&mut self) -> Result<()> {
        self.finish_transaction("ROLLBACK")
    }

    /// Rolls back if a transaction is open; closes the session when even
    /// that fails so no transaction is left dangling.
    pub fn abort_transaction(&mut self) {
        if !self.in_transaction {
            return;
        }
        if let Err(e) = self.rollback() {
            tracing::warn!(error = %e, "Rollback failed, closing connection");
            self.close();
        }
    }

    /// Releases the session. Safe to call when already disconnected.
    pub fn close(&mut self) {
        if self.connection.is_some() {
            tracing::debug!(target_db = %self.connector.describe(), "Closing connection");
        }
        self.discard_connection();
        self.in_transaction = false;
    }

    fn finish_transaction(&mut self, sql: &str) -> Result<()> {
        if !self.in_transaction {
            return Err(Error::Validation(format!(
                "{sql} issued without an open transaction"
            )));
        }
        let result = self.execute(sql, &[], FetchMode::None);
        self.in_transaction = false;
        result.map(|_| ())
    }

    fn run(
        &mut self,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> std::result::Result<QueryOutput, DriverError> {
        match self.connection.as_mut() {
            Some(conn) => conn.execute(sql, params, mode),
            None => Err(DriverError::Transport("not connected".to_string())),
        }
    }

    fn discard_connection(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.state = ConnectionState::Disconnected;
    }

    fn ensure_not_cancelled(&self, operation: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled(format!("'{operation}' not started")));
        }
        Ok(())
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        self.abort_transaction();
        self.discard_connection();
    }
}

/// Lower-cased leading keyword of a statement, used as the operation label.
fn statement_kind(sql: &str) -> String {
    sql.split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_lowercase()
}
