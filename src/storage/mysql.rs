//! MySQL / `MariaDB` adapter.
//!
//! Statements arrive with `%s` placeholders and are rewritten to the
//! driver's `?` form just before execution. Like the PostgreSQL adapter,
//! each session owns a current-thread runtime.

use super::traits::{Connection, Connector, DriverError, FetchMode, QueryOutput};
use crate::config::ServerConfig;
use crate::models::{Dialect, Value};
use mysql_async::consts::ColumnType as WireType;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, Row};
use secrecy::ExposeSecret;
use tokio::runtime::Runtime;

/// Server error codes that mean the session itself is gone.
const SESSION_LOST_CODES: &[u16] = &[
    1053, // ER_SERVER_SHUTDOWN
    1152, // ER_ABORTING_CONNECTION
    1927, // ER_CONNECTION_KILLED
    2006, // CR_SERVER_GONE_ERROR
    2013, // CR_SERVER_LOST
];

/// Opens sessions on one MySQL server.
#[derive(Debug, Clone)]
pub struct MySqlConnector {
    config: ServerConfig,
}

impl MySqlConnector {
    /// Connector for the server described by `config`.
    #[must_use]
    pub const fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Connection descriptor.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn opts(&self) -> OptsBuilder {
        let password = self
            .config
            .has_password()
            .then(|| self.config.password.expose_secret().to_string());
        OptsBuilder::default()
            .ip_or_hostname(self.config.host.clone())
            .tcp_port(self.config.port)
            .user(Some(self.config.user.clone()))
            .pass(password)
            .db_name(Some(self.config.database.clone()))
            // UPDATE reports matched rows, not changed rows.
            .client_found_rows(true)
    }
}

impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn describe(&self) -> String {
        format!("mysql://{}", self.config)
    }

    fn connect(&self) -> Result<MySqlConnection, DriverError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverError::Transport(format!("cannot create runtime: {e}")))?;
        let conn = runtime
            .block_on(Conn::new(self.opts()))
            .map_err(|e| DriverError::Transport(e.to_string()))?;
        Ok(MySqlConnection {
            conn: Some(conn),
            runtime,
        })
    }
}

/// One MySQL session and the runtime that drives it.
pub struct MySqlConnection {
    conn: Option<Conn>,
    runtime: Runtime,
}

impl MySqlConnection {
    async fn run(
        conn: &mut Conn,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> Result<QueryOutput, mysql_async::Error> {
        let rows: Vec<Row> = if params.is_empty() {
            // Unbound statements go through the text protocol verbatim.
            if mode == FetchMode::None {
                conn.query_drop(sql).await?;
                Vec::new()
            } else {
                conn.query(sql).await?
            }
        } else {
            let sql = rewrite_placeholders(sql);
            let params = Params::Positional(params.iter().map(to_wire).collect());
            if mode == FetchMode::None {
                conn.exec_drop(sql, params).await?;
                Vec::new()
            } else {
                conn.exec(sql, params).await?
            }
        };

        if mode == FetchMode::None {
            return Ok(QueryOutput {
                rows: Vec::new(),
                rows_affected: conn.affected_rows(),
                last_insert_id: conn.last_insert_id().and_then(|id| i64::try_from(id).ok()),
            });
        }

        let limit = if mode == FetchMode::One { 1 } else { rows.len() };
        let decoded: Vec<Vec<Value>> = rows.iter().take(limit).map(from_row).collect();
        Ok(QueryOutput {
            rows_affected: rows.len() as u64,
            ..QueryOutput::with_rows(decoded)
        })
    }
}

impl Connection for MySqlConnection {
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> Result<QueryOutput, DriverError> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(DriverError::Transport("session already closed".to_string()));
        };
        self.runtime
            .block_on(Self::run(conn, sql, params, mode))
            .map_err(classify_error)
    }
}

impl Drop for MySqlConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.disconnect()) {
                tracing::debug!(error = %e, "MySQL disconnect reported an error");
            }
        }
    }
}

/// Sorts a driver error into the transport or statement class.
pub fn classify_error(e: mysql_async::Error) -> DriverError {
    let transport = match &e {
        mysql_async::Error::Server(server) => SESSION_LOST_CODES.contains(&server.code),
        mysql_async::Error::Driver(driver) => {
            matches!(driver, mysql_async::DriverError::ConnectionClosed)
        },
        mysql_async::Error::Io(_) | mysql_async::Error::Url(_) => true,
        _ => false,
    };
    if transport {
        DriverError::Transport(e.to_string())
    } else {
        DriverError::Statement(e.to_string())
    }
}

/// Rewrites `%s` placeholders to `?` and `%%` to `%`, leaving quoted
/// literals and identifiers untouched.
#[must_use]
pub fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == '\\' && q != '`' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if c == q {
                    quote = None;
                }
            },
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    out.push(c);
                },
                '%' if chars.peek() == Some(&'s') => {
                    chars.next();
                    out.push('?');
                },
                '%' if chars.peek() == Some(&'%') => {
                    chars.next();
                    out.push('%');
                },
                _ => out.push(c),
            },
        }
    }
    out
}

fn to_wire(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(b) => mysql_async::Value::Int(i64::from(*b)),
        Value::Int(i) => mysql_async::Value::Int(*i),
        Value::Real(f) => mysql_async::Value::Double(*f),
        Value::Text(s) => mysql_async::Value::Bytes(s.clone().into_bytes()),
        Value::Blob(bytes) => mysql_async::Value::Bytes(bytes.clone()),
        Value::Json(json) => mysql_async::Value::Bytes(json.to_string().into_bytes()),
    }
}

fn from_row(row: &Row) -> Vec<Value> {
    let columns = row.columns_ref();
    (0..row.len())
        .map(|i| {
            let wire_type = columns.get(i).map(mysql_async::Column::column_type);
            row.as_ref(i)
                .map_or(Value::Null, |raw| from_wire(raw, wire_type))
        })
        .collect()
}

fn from_wire(raw: &mysql_async::Value, wire_type: Option<WireType>) -> Value {
    match raw {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes.clone()) {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Blob(bytes.clone()),
        },
        mysql_async::Value::Int(i) => Value::Int(*i),
        mysql_async::Value::UInt(u) => {
            i64::try_from(*u).map_or_else(|_| Value::Text(u.to_string()), Value::Int)
        },
        mysql_async::Value::Float(f) => Value::Real(f64::from(*f)),
        mysql_async::Value::Double(f) => Value::Real(*f),
        mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
            if wire_type == Some(WireType::MYSQL_TYPE_DATE) {
                Value::Text(format!("{year:04}-{month:02}-{day:02}"))
            } else {
                Value::Text(format!(
                    "{year:04}-{month:02}-{day:02} {}",
                    clock(u32::from(*hour), *minute, *second, *micros)
                ))
            }
        },
        mysql_async::Value::Time(negative, days, hour, minute, second, micros) => {
            let hours = days.saturating_mul(24).saturating_add(u32::from(*hour));
            let sign = if *negative { "-" } else { "" };
            Value::Text(format!("{sign}{}", clock(hours, *minute, *second, *micros)))
        },
    }
}

fn clock(hours: u32, minute: u8, second: u8, micros: u32) -> String {
    if micros == 0 {
        format!("{hours:02}:{minute:02}:{second:02}")
    } else {
        format!("{hours:02}:{minute:02}:{second:02}.{micros:06}")
    }
}
