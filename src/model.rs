//! Per-instance CRUD facade.
//!
//! A [`Model`] binds one [`Table`] definition to one live [`Record`] and
//! one [`ConnectionManager`]. It composes the statement builder, the
//! decoder, schema sync and the optional shared [`QueryCache`].
//!
//! # Lifecycle
//!
//! The table is synchronised with the database (created, or extended with
//! missing columns) once per instance, before the first data operation.
//! The connection opens lazily and is reused until [`Model::close`] or
//! drop.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut user = Model::new(users, SqliteConnector::new("app.db"))
//!     .with_migrations(MigrationWriter::disabled());
//! user.set("name", "Alice")?;
//! let id = user.save()?;
//!
//! let mut other = Model::new(Arc::clone(user.table()), SqliteConnector::new("app.db"));
//! assert!(other.load_one(id)?);
//! ```

use crate::cache::QueryCache;
use crate::config::{MigrationSettings, QuerySmithConfig, RetrySettings};
use crate::models::{Record, Table, Value};
use crate::schema::{MigrationWriter, SyncOutcome, sync_table};
use crate::statement::{Condition, Intent, Statement, StatementBuilder};
use crate::storage::{
    AnyConnector, CancellationToken, ConnectionManager, ConnectionState, Connector, FetchMode,
    QueryOutput, ResultDecoder,
};
use crate::{Error, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// One table row plus the session used to persist it.
pub struct Model<C: Connector> {
    table: Arc<Table>,
    record: Record,
    manager: ConnectionManager<C>,
    cache: Option<Arc<QueryCache>>,
    migrations: MigrationWriter,
    synced: bool,
}

impl<C: Connector> Model<C> {
    /// Creates a model with default retries, no cache, and migration
    /// records written under the working directory.
    ///
    /// A connector of another dialect is reported by the first data
    /// operation.
    #[must_use]
    pub fn new(table: Arc<Table>, connector: C) -> Self {
        Self {
            record: table.new_record(),
            manager: ConnectionManager::new(connector, RetrySettings::default()),
            table,
            cache: None,
            migrations: MigrationWriter::new(MigrationSettings::default()),
            synced: false,
        }
    }

    /// Sets the reconnect policy.
    #[must_use]
    pub fn with_retry(self, retry: RetrySettings) -> Self {
        self.map_manager(|manager| manager.with_retry(retry))
    }

    /// Attaches a cache shared with other models.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the migration record writer.
    #[must_use]
    pub fn with_migrations(mut self, migrations: MigrationWriter) -> Self {
        self.migrations = migrations;
        self
    }

    /// Derives this model's cancellation from `token`.
    #[must_use]
    pub fn with_cancellation_token(self, token: CancellationToken) -> Self {
        self.map_manager(|manager| manager.with_cancellation_token(token))
    }

    fn map_manager(
        self,
        f: impl FnOnce(ConnectionManager<C>) -> ConnectionManager<C>,
    ) -> Self {
        let Self {
            table,
            record,
            manager,
            cache,
            migrations,
            synced,
        } = self;
        Self {
            table,
            record,
            manager: f(manager),
            cache,
            migrations,
            synced,
        }
    }

    /// The table definition.
    #[must_use]
    pub const fn table(&self) -> &Arc<Table> {
        &self.table
    }

    /// The live record.
    #[must_use]
    pub const fn record(&self) -> &Record {
        &self.record
    }

    /// Mutable access to the live record.
    pub const fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Returns a column's current value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.record.get(column)
    }

    /// Sets a column's value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the table has no such column.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Result<()> {
        self.record.set(column, value)
    }

    /// Clears every value, so the next [`Model::save`] inserts.
    pub fn reset(&mut self) {
        self.record = self.table.new_record();
    }

    /// Token that interrupts this model's retries and statements.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.manager.cancellation_token()
    }

    /// Re-arms a cancelled model; see [`ConnectionManager::reset_cancellation`].
    pub fn reset_cancellation(&mut self) -> CancellationToken {
        self.manager.reset_cancellation()
    }

    /// Connection lifecycle state.
    #[must_use]
    pub const fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Whether a transaction is open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.manager.in_transaction()
    }

    /// Creates the table or adds missing columns, once per instance.
    ///
    /// Returns `None` when the table was already synchronised by this
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] for an invalid reference graph,
    /// [`Error::Validation`] when the connector's dialect differs from the
    /// table's, and any execution error.
    pub fn ensure_table_exists(&mut self) -> Result<Option<SyncOutcome>> {
        if self.synced {
            return Ok(None);
        }
        let connector_dialect = self.manager.dialect();
        if connector_dialect != self.table.dialect() {
            return Err(Error::Validation(format!(
                "table '{}' is defined for {} but the connector targets {}",
                self.table.name(),
                self.table.dialect().as_str(),
                connector_dialect.as_str()
            )));
        }
        let outcome = sync_table(&mut self.manager, &self.table, &self.migrations)?;
        self.synced = true;
        Ok(Some(outcome))
    }

    /// Inserts the record when its identity is empty, otherwise updates it.
    ///
    /// After an insert the assigned identity is stored in the record. An
    /// update that matches no row (the row was deleted) re-inserts the
    /// record under its current identity. Tables without a primary key
    /// always insert.
    ///
    /// Returns the identity, or `NULL` when the backend reports none.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the backend rejects the write, plus
    /// any [`Model::ensure_table_exists`] error.
    pub fn save(&mut self) -> Result<Value> {
        self.ensure_table_exists()?;

        let existing = self
            .record
            .primary_key_value()
            .filter(|value| !value.is_null())
            .cloned();

        if let Some(id) = existing {
            let statement = StatementBuilder::new(&self.table).build(Intent::Update(&self.record))?;
            let output = self.run(&statement, FetchMode::None)?;
            if output.rows_affected > 0 {
                tracing::debug!(
                    table = self.table.name(),
                    rows_affected = output.rows_affected,
                    "Updated record"
                );
                return Ok(id);
            }
            tracing::debug!(table = self.table.name(), id = ?id, "No row to update, inserting");
        }

        self.insert()
    }

    fn insert(&mut self) -> Result<Value> {
        let statement = StatementBuilder::new(&self.table).build(Intent::Insert(&self.record))?;
        let returning = self.table.dialect().supports_returning() && self.table.primary_key().is_some();
        let mode = if returning { FetchMode::One } else { FetchMode::None };
        let output = self.run(&statement, mode)?;

        let raw = match output.first_row().and_then(<[Value]>::first) {
            Some(value) => value.clone(),
            None => output.last_insert_id.map_or(Value::Null, Value::Int),
        };

        match self.table.primary_key() {
            Some(pk) => {
                // An explicit identity wins over whatever the driver reports.
                let id = match self.record.get(pk.name()) {
                    Some(explicit) if !explicit.is_null() => explicit.clone(),
                    _ => ResultDecoder::decode_value(pk, raw),
                };
                self.record.set(pk.name(), id.clone())?;
                tracing::debug!(table = self.table.name(), id = ?id, "Inserted record");
                Ok(id)
            },
            None => Ok(raw),
        }
    }

    /// Loads the row with primary-key value `id` into the record.
    ///
    /// Returns `false`, leaving the record untouched, when no row matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the table has no primary key or
    /// `id` is `NULL`, [`Error::Decode`] for a malformed row, and any
    /// execution error.
    pub fn load_one(&mut self, id: impl Into<Value>) -> Result<bool> {
        let id = id.into();
        self.ensure_table_exists()?;
        let statement = StatementBuilder::new(&self.table).build(Intent::SelectById(&id))?;
        self.load_first(&statement)
    }

    /// Loads the first row matching every condition into the record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for empty conditions or unknown
    /// columns, [`Error::Decode`] for a malformed row, and any execution
    /// error.
    pub fn load_one_by(&mut self, conditions: &[Condition]) -> Result<bool> {
        self.ensure_table_exists()?;
        let statement =
            StatementBuilder::new(&self.table).build(Intent::SelectByPredicate(conditions))?;
        self.load_first(&statement)
    }

    /// Deletes the row identified by the record's primary-key value.
    ///
    /// Returns the number of rows removed. The record keeps its values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the table has no primary key or the
    /// record has no identity value, and any execution error.
    pub fn delete(&mut self) -> Result<u64> {
        let pk = self
            .table
            .primary_key()
            .map(|column| column.name().to_string())
            .ok_or_else(|| {
                Error::Validation(format!(
                    "delete on '{}' requires a primary key column",
                    self.table.name()
                ))
            })?;
        let id = self
            .record
            .primary_key_value()
            .filter(|value| !value.is_null())
            .cloned()
            .ok_or_else(|| {
                Error::Validation(format!(
                    "delete on '{}' requires a value for primary key '{}'",
                    self.table.name(),
                    pk
                ))
            })?;

        self.ensure_table_exists()?;
        let conditions = [Condition::eq(pk, id)];
        let statement = StatementBuilder::new(&self.table).build(Intent::Delete(&conditions))?;
        let output = self.run(&statement, FetchMode::None)?;
        tracing::debug!(
            table = self.table.name(),
            rows_affected = output.rows_affected,
            "Deleted record"
        );
        Ok(output.rows_affected)
    }

    /// Returns every row. Malformed rows are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns any execution error.
    pub fn get_all(&mut self) -> Result<Vec<Record>> {
        self.ensure_table_exists()?;
        let statement = StatementBuilder::new(&self.table).build(Intent::SelectAll)?;
        self.fetch_all(&statement)
    }

    /// Returns every row matching all conditions; no conditions means
    /// every row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for unknown columns and any execution
    /// error.
    pub fn get_all_by(&mut self, conditions: &[Condition]) -> Result<Vec<Record>> {
        if conditions.is_empty() {
            return self.get_all();
        }
        self.ensure_table_exists()?;
        let statement =
            StatementBuilder::new(&self.table).build(Intent::SelectByPredicate(conditions))?;
        self.fetch_all(&statement)
    }

    /// Runs caller-supplied SQL, written in the dialect's placeholder
    /// convention, and returns the raw rows.
    ///
    /// SELECT statements are served from the attached cache when present.
    ///
    /// # Errors
    ///
    /// Returns any execution error; failures are never cached.
    pub fn execute_query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        self.ensure_table_exists()?;
        let manager = &mut self.manager;
        let mut fetch = || manager.execute(sql, params, FetchMode::All).map(|output| output.rows);
        match &self.cache {
            Some(cache) => cache.get_or_fetch(sql, params, fetch),
            None => fetch(),
        }
    }

    /// Runs `scope` inside a transaction.
    ///
    /// Commits when `scope` returns `Ok`. Rolls back when it returns `Err`
    /// or panics; the panic then resumes. On rollback the record is
    /// restored to its state before `scope` ran.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if a transaction is already open, the
    /// error returned by `scope`, or a failure to begin or commit.
    pub fn transaction<T, F>(&mut self, scope: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.ensure_table_exists()?;
        self.manager.begin()?;
        let snapshot = self.record.clone();

        match panic::catch_unwind(AssertUnwindSafe(|| scope(self))) {
            Ok(Ok(value)) => {
                if let Err(e) = self.manager.commit() {
                    self.manager.abort_transaction();
                    self.record = snapshot;
                    return Err(e);
                }
                Ok(value)
            },
            Ok(Err(e)) => {
                tracing::debug!(table = self.table.name(), error = %e, "Rolling back transaction");
                self.manager.abort_transaction();
                self.record = snapshot;
                Err(e)
            },
            Err(payload) => {
                self.manager.abort_transaction();
                self.record = snapshot;
                panic::resume_unwind(payload)
            },
        }
    }

    /// Releases the connection. The model reconnects on next use.
    pub fn close(&mut self) {
        self.manager.close();
    }

    fn run(&mut self, statement: &Statement, mode: FetchMode) -> Result<QueryOutput> {
        self.manager.execute(&statement.sql, &statement.params, mode)
    }

    fn load_first(&mut self, statement: &Statement) -> Result<bool> {
        let output = self.run(statement, FetchMode::One)?;
        let Some(row) = output.rows.into_iter().next() else {
            return Ok(false);
        };
        let loaded = ResultDecoder::decode_row(&self.table, row)?;
        self.record.assign(loaded);
        Ok(true)
    }

    fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Record>> {
        let output = self.run(statement, FetchMode::All)?;
        Ok(ResultDecoder::decode_rows(&self.table, output.rows))
    }
}

impl Model<AnyConnector> {
    /// Creates a model for the database, retries and migration settings in
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no database is configured or
    /// its adapter is not compiled in.
    pub fn from_config(table: Arc<Table>, config: &QuerySmithConfig) -> Result<Self> {
        let database = config.require_database()?;
        let connector = AnyConnector::from_config(database)?;
        Ok(Self::new(table, connector)
            .with_retry(database.retry())
            .with_migrations(MigrationWriter::new(config.migrations.clone())))
    }
}
