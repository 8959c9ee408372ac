//! PostgreSQL adapter.
//!
//! The core API is synchronous, so each session owns a current-thread
//! tokio runtime. The driver's connection task is spawned on that runtime
//! and makes progress whenever a statement is awaited on the session.

use super::traits::{Connection, Connector, DriverError, FetchMode, QueryOutput};
use crate::config::ServerConfig;
use crate::models::{Dialect, Value};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use secrecy::ExposeSecret;
use std::error::Error as StdError;
use tokio::runtime::Runtime;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Opens sessions on one PostgreSQL server.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: ServerConfig,
}

impl PgConnector {
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

    fn driver_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .dbname(&self.config.database)
            .application_name("querysmith");
        if self.config.has_password() {
            config.password(self.config.password.expose_secret());
        }
        config
    }
}

impl Connector for PgConnector {
    type Connection = PgConnection;

    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn describe(&self) -> String {
        format!("postgresql://{}", self.config)
    }

    fn connect(&self) -> Result<PgConnection, DriverError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DriverError::Transport(format!("cannot create runtime: {e}")))?;

        let config = self.driver_config();
        let (client, connection) = runtime
            .block_on(config.connect(NoTls))
            .map_err(|e| DriverError::Transport(e.to_string()))?;

        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "PostgreSQL connection task ended with an error");
            }
        });

        Ok(PgConnection { client, runtime })
    }
}

/// One PostgreSQL session and the runtime that drives it.
pub struct PgConnection {
    client: Client,
    runtime: Runtime,
}

impl PgConnection {
    fn block_on<F: std::future::Future>(&self, f: F) -> F::Output {
        self.runtime.block_on(f)
    }
}

impl Connection for PgConnection {
    fn execute(
        &mut self,
        sql: &str,
        params: &[Value],
        mode: FetchMode,
    ) -> Result<QueryOutput, DriverError> {
        if params.is_empty() && mode == FetchMode::None {
            // Simple protocol: no prepare round trip for DDL and BEGIN/COMMIT.
            self.block_on(self.client.batch_execute(sql))
                .map_err(classify_error)?;
            return Ok(QueryOutput::default());
        }

        let wrapped: Vec<PgParam<'_>> = params.iter().map(PgParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = wrapped.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if mode == FetchMode::None {
            let affected = self
                .block_on(self.client.execute(sql, &refs))
                .map_err(classify_error)?;
            return Ok(QueryOutput {
                rows_affected: affected,
                ..QueryOutput::default()
            });
        }

        let rows = self
            .block_on(self.client.query(sql, &refs))
            .map_err(classify_error)?;
        let limit = if mode == FetchMode::One { 1 } else { rows.len() };

        let mut out = Vec::with_capacity(limit.min(rows.len()));
        for row in rows.iter().take(limit) {
            let mut values = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                let cell: PgCell = row
                    .try_get(i)
                    .map_err(|e| DriverError::Statement(format!("column {i}: {e}")))?;
                values.push(cell.0);
            }
            out.push(values);
        }

        Ok(QueryOutput {
            rows_affected: rows.len() as u64,
            ..QueryOutput::with_rows(out)
        })
    }

    fn is_alive(&self) -> bool {
        !self.client.is_closed()
    }

    fn close(self) {
        drop(self.client);
        self.runtime.shutdown_background();
    }
}

/// Sorts a driver error into the transport or statement class.
///
/// Server errors are statement errors unless their SQLSTATE reports a
/// lost or terminated session.
pub fn classify_error(e: tokio_postgres::Error) -> DriverError {
    if let Some(db) = e.as_db_error() {
        let code = db.code();
        if code.code().starts_with("08")
            || *code == SqlState::ADMIN_SHUTDOWN
            || *code == SqlState::CRASH_SHUTDOWN
        {
            return DriverError::Transport(e.to_string());
        }
        return DriverError::Statement(e.to_string());
    }

    let io = e
        .source()
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
    if e.is_closed() || io {
        DriverError::Transport(e.to_string())
    } else {
        DriverError::Statement(e.to_string())
    }
}

/// Binds a [`Value`] to whatever parameter type the server inferred.
#[derive(Debug)]
struct PgParam<'a>(&'a Value);

impl ToSql for PgParam<'_> {
    #[allow(clippy::cast_possible_truncation)]
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => {
                if is_integer(ty) {
                    int_to_sql(i64::from(*b), ty, out)
                } else {
                    b.to_sql(ty, out)
                }
            },
            Value::Int(i) => {
                if is_integer(ty) {
                    int_to_sql(*i, ty, out)
                } else if *ty == Type::BOOL {
                    (*i != 0).to_sql(ty, out)
                } else if *ty == Type::INTERVAL {
                    interval_to_sql(i.saturating_mul(1_000_000), out)
                } else {
                    text_to_sql(&i.to_string(), ty, out)
                }
            },
            Value::Real(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    f.to_sql(ty, out)
                } else {
                    text_to_sql(&f.to_string(), ty, out)
                }
            },
            Value::Text(s) => text_to_sql(s, ty, out),
            Value::Blob(bytes) => bytes.as_slice().to_sql(ty, out),
            Value::Json(json) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    json.to_sql(ty, out)
                } else {
                    json.to_string().as_str().to_sql(ty, out)
                }
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_integer(ty: &Type) -> bool {
    *ty == Type::INT2 || *ty == Type::INT4 || *ty == Type::INT8 || *ty == Type::OID
}

fn int_to_sql(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(value)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(value)?.to_sql(ty, out)
    } else if *ty == Type::OID {
        u32::try_from(value)?.to_sql(ty, out)
    } else {
        value.to_sql(ty, out)
    }
}

/// Text reaches typed parameters by parsing it into the target type.
fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if is_integer(ty) {
        int_to_sql(s.trim().parse()?, ty, out)
    } else if *ty == Type::FLOAT4 {
        s.trim().parse::<f32>()?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        s.trim().parse::<f64>()?.to_sql(ty, out)
    } else if *ty == Type::BOOL {
        parse_bool(s)?.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        numeric_to_sql(s.trim(), out)
    } else if *ty == Type::TIMESTAMP {
        parse_timestamp(s)?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        parse_timestamptz(s)?.to_sql(ty, out)
    } else if *ty == Type::DATE {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out)
    } else if *ty == Type::TIME {
        NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?.to_sql(ty, out)
    } else if *ty == Type::INTERVAL {
        interval_to_sql(parse_interval_micros(s)?, out)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
    } else if *ty == Type::BYTEA {
        s.as_bytes().to_sql(ty, out)
    } else {
        s.to_sql(&Type::TEXT, out)
    }
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "yes" | "on" => Ok(true),
        "f" | "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("not a boolean: '{other}'").into()),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::default())))
        .map_err(Into::into)
}

fn parse_timestamptz(s: &str) -> Result<DateTime<Utc>, BoxError> {
    match DateTime::parse_from_rfc3339(s.trim()) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => parse_timestamp(s).map(|naive| naive.and_utc()),
    }
}

/// Accepts `HH:MM:SS[.ffffff]` or a number of seconds.
fn parse_interval_micros(s: &str) -> Result<i64, BoxError> {
    let s = s.trim();
    if let Ok(seconds) = s.parse::<f64>() {
        #[allow(clippy::cast_possible_truncation)]
        return Ok((seconds * 1_000_000.0).round() as i64);
    }
    let (negative, body) = s.strip_prefix('-').map_or((false, s), |rest| (true, rest));
    let mut parts = body.splitn(3, ':');
    let (Some(h), Some(m), Some(sec)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(format!("not an interval: '{s}'").into());
    };
    let hours: i64 = h.parse()?;
    let minutes: i64 = m.parse()?;
    let seconds: f64 = sec.parse()?;
    #[allow(clippy::cast_possible_truncation)]
    let micros = (hours * 3600 + minutes * 60) * 1_000_000 + (seconds * 1_000_000.0).round() as i64;
    Ok(if negative { -micros } else { micros })
}

fn interval_to_sql(micros: i64, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    out.put_i64(micros);
    out.put_i32(0);
    out.put_i32(0);
    Ok(IsNull::No)
}

fn format_interval(raw: &[u8]) -> Result<String, BoxError> {
    let [a, b, c, d, e, f, g, h, rest @ ..] = raw else {
        return Err("interval value too short".into());
    };
    let micros = i64::from_be_bytes([*a, *b, *c, *d, *e, *f, *g, *h]);
    let [d0, d1, d2, d3, m0, m1, m2, m3] = rest else {
        return Err("interval value has an unexpected length".into());
    };
    let days = i32::from_be_bytes([*d0, *d1, *d2, *d3]);
    let months = i32::from_be_bytes([*m0, *m1, *m2, *m3]);

    let mut parts = Vec::new();
    if months != 0 {
        parts.push(format!("{months} mons"));
    }
    if days != 0 {
        parts.push(format!("{days} days"));
    }
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let (secs, frac) = (abs / 1_000_000, abs % 1_000_000);
    let mut clock = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
    if frac != 0 {
        clock.push_str(format!(".{frac:06}").trim_end_matches('0'));
    }
    if micros != 0 || parts.is_empty() {
        parts.push(clock);
    }
    Ok(parts.join(" "))
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// Encodes a plain decimal literal in the binary NUMERIC format: base-10000
/// digit groups around the decimal point.
fn numeric_to_sql(s: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if s.eq_ignore_ascii_case("nan") {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_NAN);
        out.put_i16(0);
        return Ok(IsNull::No);
    }

    let (sign, body) = match (s.strip_prefix('-'), s.strip_prefix('+')) {
        (Some(rest), _) => (NUMERIC_NEG, rest),
        (None, Some(rest)) => (NUMERIC_POS, rest),
        (None, None) => (NUMERIC_POS, s),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit())
    {
        return Err(format!("not a decimal number: '{s}'").into());
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = i16::try_from(frac_part.len())?;

    let mut int_digits = "0".repeat((4 - int_part.len() % 4) % 4);
    int_digits.push_str(int_part);
    let mut frac_digits = frac_part.to_string();
    frac_digits.push_str(&"0".repeat((4 - frac_part.len() % 4) % 4));

    let int_groups = int_digits.len() / 4;
    let mut groups: Vec<i16> = int_digits
        .as_bytes()
        .chunks(4)
        .chain(frac_digits.as_bytes().chunks(4))
        .map(|chunk| {
            chunk
                .iter()
                .fold(0_i16, |acc, b| acc * 10 + i16::from(b - b'0'))
        })
        .collect();
    let mut weight = i16::try_from(int_groups)? - 1;

    let leading = groups.iter().take_while(|g| **g == 0).count();
    groups.drain(..leading);
    weight -= i16::try_from(leading)?;
    while groups.last() == Some(&0) {
        groups.pop();
    }

    if groups.is_empty() {
        out.put_i16(0);
        out.put_i16(0);
        out.put_u16(NUMERIC_POS);
    } else {
        out.put_i16(i16::try_from(groups.len())?);
        out.put_i16(weight);
        out.put_u16(sign);
    }
    out.put_i16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(IsNull::No)
}

/// Decodes binary NUMERIC into its canonical decimal text.
fn format_numeric(raw: &[u8]) -> Result<String, BoxError> {
    let words: Vec<i16> = raw
        .chunks_exact(2)
        .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    let [ndigits, weight, sign, dscale, digits @ ..] = words.as_slice() else {
        return Err("numeric value too short".into());
    };
    #[allow(clippy::cast_sign_loss)]
    let sign = *sign as u16;
    if sign == NUMERIC_NAN {
        return Ok("NaN".to_string());
    }
    let ndigits = usize::try_from(*ndigits)?;
    if digits.len() < ndigits {
        return Err("numeric value truncated".into());
    }

    let weight = i32::from(*weight);
    let digit_at = |exponent: i32| -> i16 {
        usize::try_from(weight - exponent)
            .ok()
            .filter(|i| *i < ndigits)
            .map_or(0, |i| digits[i])
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit_at(weight).to_string());
        for exponent in (0..weight).rev() {
            text.push_str(&format!("{:04}", digit_at(exponent)));
        }
    }

    let dscale = usize::try_from(*dscale)?;
    if dscale > 0 {
        let groups = i32::try_from(dscale.div_ceil(4))?;
        let mut frac = String::new();
        for exponent in 1..=groups {
            frac.push_str(&format!("{:04}", digit_at(-exponent)));
        }
        frac.truncate(dscale);
        text.push('.');
        text.push_str(&frac);
    }
    Ok(text)
}

/// Reads any column into a [`Value`].
struct PgCell(Value);

impl<'a> FromSql<'a> for PgCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = if *ty == Type::BOOL {
            Value::Bool(bool::from_sql(ty, raw)?)
        } else if *ty == Type::INT2 {
            Value::Int(i16::from_sql(ty, raw)?.into())
        } else if *ty == Type::INT4 {
            Value::Int(i32::from_sql(ty, raw)?.into())
        } else if *ty == Type::INT8 {
            Value::Int(i64::from_sql(ty, raw)?)
        } else if *ty == Type::OID {
            Value::Int(u32::from_sql(ty, raw)?.into())
        } else if *ty == Type::FLOAT4 {
            Value::Real(f32::from_sql(ty, raw)?.into())
        } else if *ty == Type::FLOAT8 {
            Value::Real(f64::from_sql(ty, raw)?)
        } else if *ty == Type::NUMERIC {
            Value::Text(format_numeric(raw)?)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            Value::Json(serde_json::Value::from_sql(ty, raw)?)
        } else if *ty == Type::BYTEA {
            Value::Blob(raw.to_vec())
        } else if *ty == Type::TIMESTAMP {
            let ts = NaiveDateTime::from_sql(ty, raw)?;
            Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())
        } else if *ty == Type::TIMESTAMPTZ {
            Value::Text(DateTime::<Utc>::from_sql(ty, raw)?.to_rfc3339())
        } else if *ty == Type::DATE {
            Value::Text(NaiveDate::from_sql(ty, raw)?.format("%Y-%m-%d").to_string())
        } else if *ty == Type::TIME {
            Value::Text(NaiveTime::from_sql(ty, raw)?.format("%H:%M:%S%.f").to_string())
        } else if *ty == Type::INTERVAL {
            Value::Text(format_interval(raw)?)
        } else {
            match std::str::from_utf8(raw) {
                Ok(s) => Value::Text(s.to_string()),
                Err(_) => Value::Blob(raw.to_vec()),
            }
        };
        Ok(Self(value))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Self(Value::Null))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn numeric_roundtrip(input: &str) -> String {
        let mut buf = BytesMut::new();
        numeric_to_sql(input, &mut buf).unwrap();
        format_numeric(&buf).unwrap()
    }

    #[test_case("0", "0")]
    #[test_case("12345.678", "12345.678")]
    #[test_case("-0.05", "-0.05")]
    #[test_case("00042", "42")]
    #[test_case("100000000", "100000000")]
    #[test_case("0.00000001", "0.00000001")]
    #[test_case("3.10", "3.10")]
    #[test_case("NaN", "NaN")]
    fn test_numeric_text_survives_binary_encoding(input: &str, expected: &str) {
        assert_eq!(numeric_roundtrip(input), expected);
    }

    #[test]
    fn test_numeric_rejects_garbage() {
        let mut buf = BytesMut::new();
        assert!(numeric_to_sql("12a", &mut buf).is_err());
        assert!(numeric_to_sql(".", &mut buf).is_err());
    }

    #[test_case("01:02:03", 3_723_000_000)]
    #[test_case("-00:00:01.5", -1_500_000)]
    #[test_case("90", 90_000_000)]
    fn test_parse_interval(input: &str, micros: i64) {
        assert_eq!(parse_interval_micros(input).unwrap(), micros);
    }

    #[test]
    fn test_format_interval() {
        let mut buf = BytesMut::new();
        buf.put_i64(3_723_500_000);
        buf.put_i32(2);
        buf.put_i32(1);
        assert_eq!(format_interval(&buf).unwrap(), "1 mons 2 days 01:02:03.5");
    }

    #[test]
    fn test_timestamp_parsing_accepts_common_shapes() {
        assert!(parse_timestamp("2024-01-31 12:00:00").is_ok());
        assert!(parse_timestamp("2024-01-31T12:00:00.25").is_ok());
        assert!(parse_timestamp("2024-01-31").is_ok());
        assert!(parse_timestamptz("2024-01-31T12:00:00+02:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_describe_hides_password() {
        let connector = PgConnector::new(
            ServerConfig::new("db.local", 5432, "app", "shop").with_password("hunter2"),
        );
        let described = connector.describe();
        assert_eq!(described, "postgresql://app@db.local:5432/shop");
        assert!(!described.contains("hunter2"));
    }
}
