//! `SQLite` end-to-end tests.
//!
//! Exercises the full stack (schema sync, statement building, the
//! connection manager, decoding and the query cache) against real
//! database files in temporary directories.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use querysmith::config::MigrationSettings;
use querysmith::schema::{MigrationWriter, SyncOutcome};
use querysmith::storage::SqliteConnector;
use querysmith::{
    ColumnSpec, ColumnType, Condition, Dialect, Error, Model, QueryCache, SchemaBuilder, Table,
    Value,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn users_table() -> Arc<Table> {
    Table::new(
        "users",
        Dialect::Sqlite,
        vec![
            ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
            ColumnSpec::new("name", ColumnType::Text).unwrap(),
            ColumnSpec::new("active", ColumnType::Boolean).unwrap(),
        ],
    )
    .unwrap()
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn connector(&self) -> SqliteConnector {
        SqliteConnector::new(self.dir.path().join("app.db"))
    }

    fn migrations(&self) -> MigrationWriter {
        MigrationWriter::new(MigrationSettings::in_dir(self.dir.path()))
    }

    fn model(&self, table: &Arc<Table>) -> Model<SqliteConnector> {
        Model::new(Arc::clone(table), self.connector()).with_migrations(self.migrations())
    }

    fn migration_files(&self) -> Vec<String> {
        let dir = self.dir.path().join("migrations_sqlite");
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

// ============================================================================
// CRUD round trips
// ============================================================================

#[test]
fn test_insert_and_load_by_id() {
    let fx = Fixture::new();
    let table = users_table();

    let mut writer = fx.model(&table);
    writer.set("name", "Alice").unwrap();
    writer.set("active", true).unwrap();
    let id = writer.save().unwrap();

    let mut reader = fx.model(&table);
    assert!(reader.load_one(id.clone()).unwrap());
    assert_eq!(reader.get("id"), Some(&id));
    assert_eq!(reader.get("name"), Some(&Value::from("Alice")));
    assert_eq!(reader.get("active"), Some(&Value::Bool(true)));
}

#[test]
fn test_update_round_trip() {
    let fx = Fixture::new();
    let table = users_table();

    let mut writer = fx.model(&table);
    writer.set("name", "Alice").unwrap();
    writer.set("active", true).unwrap();
    let id = writer.save().unwrap();

    writer.set("name", "Alicia").unwrap();
    writer.set("active", false).unwrap();
    assert_eq!(writer.save().unwrap(), id);
    // Saving unchanged values is still an update, not a second row.
    assert_eq!(writer.save().unwrap(), id);

    let mut reader = fx.model(&table);
    assert!(reader.load_one(id).unwrap());
    assert_eq!(reader.get("name"), Some(&Value::from("Alicia")));
    assert_eq!(reader.get("active"), Some(&Value::Bool(false)));
    assert_eq!(reader.get_all().unwrap().len(), 1);
}

#[test]
fn test_save_after_delete_reinserts_same_identity() {
    let fx = Fixture::new();
    let table = users_table();

    let mut model = fx.model(&table);
    model.set("name", "Alice").unwrap();
    let id = model.save().unwrap();
    assert_eq!(model.delete().unwrap(), 1);
    assert!(model.get_all().unwrap().is_empty());

    assert_eq!(model.save().unwrap(), id);

    let mut reader = fx.model(&table);
    assert!(reader.load_one(id).unwrap());
    assert_eq!(reader.get("name"), Some(&Value::from("Alice")));
    assert_eq!(reader.get_all().unwrap().len(), 1);
}

#[test]
fn test_save_with_explicit_unknown_identity_inserts() {
    let fx = Fixture::new();
    let table = users_table();

    let mut model = fx.model(&table);
    model.set("id", 42).unwrap();
    model.set("name", "Zed").unwrap();
    assert_eq!(model.save().unwrap(), Value::Int(42));

    let mut reader = fx.model(&table);
    assert!(reader.load_one(42).unwrap());
    assert_eq!(reader.get("name"), Some(&Value::from("Zed")));
}

#[test]
fn test_load_one_by_conditions_in_caller_order() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);

    for (name, active) in [("Alice", true), ("Bob", false), ("Alice", false)] {
        model.reset();
        model.set("name", name).unwrap();
        model.set("active", active).unwrap();
        model.save().unwrap();
    }

    let mut finder = fx.model(&table);
    let found = finder
        .load_one_by(&[Condition::eq("name", "Alice"), Condition::eq("active", false)])
        .unwrap();
    assert!(found);
    assert_eq!(finder.get("id"), Some(&Value::Int(3)));

    let matches = finder.get_all_by(&[Condition::eq("name", "Alice")]).unwrap();
    assert_eq!(matches.len(), 2);

    let err = finder.load_one_by(&[]).unwrap_err();
    assert!(matches!(err, Error::Validation(ref m) if m == "at least one condition required"));
}

#[test]
fn test_null_condition_matches_missing_values() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);
    model.set("name", "nobody").unwrap();
    model.save().unwrap();

    let rows = model.get_all_by(&[Condition::eq("active", Value::Null)]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("active"), Some(&Value::Null));
}

#[test]
fn test_unknown_condition_column_is_rejected() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);
    let err = model.get_all_by(&[Condition::eq("email", "x")]).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_constraint_violation_is_query_error() {
    let fx = Fixture::new();
    let table = Table::new(
        "accounts",
        Dialect::Sqlite,
        vec![
            ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
            ColumnSpec::sized("login", ColumnType::Varchar, 32).unwrap().unique(),
        ],
    )
    .unwrap();

    let mut first = fx.model(&table);
    first.set("login", "root").unwrap();
    first.save().unwrap();

    let mut second = fx.model(&table);
    second.set("login", "root").unwrap();
    let err = second.save().unwrap_err();
    assert!(matches!(err, Error::Query { .. }));
    assert!(!err.is_retryable());
}

#[test]
fn test_table_without_primary_key_always_inserts() {
    let fx = Fixture::new();
    let table = Table::new(
        "events",
        Dialect::Sqlite,
        vec![ColumnSpec::new("label", ColumnType::Text).unwrap()],
    )
    .unwrap();

    let mut model = fx.model(&table);
    model.set("label", "tick").unwrap();
    model.save().unwrap();
    model.save().unwrap();
    assert_eq!(model.get_all().unwrap().len(), 2);

    let err = model.delete().unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_json_column_round_trip() {
    let fx = Fixture::new();
    let table = Table::new(
        "documents",
        Dialect::Sqlite,
        vec![
            ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
            ColumnSpec::new("body", ColumnType::Json).unwrap(),
        ],
    )
    .unwrap();

    let body = serde_json::json!({"tags": ["a", "b"], "size": 3});
    let mut model = fx.model(&table);
    model.set("body", Value::Json(body.clone())).unwrap();
    let id = model.save().unwrap();

    let mut reader = fx.model(&table);
    assert!(reader.load_one(id).unwrap());
    assert_eq!(reader.get("body"), Some(&Value::Json(body)));
}

// ============================================================================
// Schema sync and migration records
// ============================================================================

#[test]
fn test_create_writes_one_migration_record() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);
    assert_eq!(model.ensure_table_exists().unwrap(), Some(SyncOutcome::Created));

    let files = fx.migration_files();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("create_users_"));
    let sql =
        std::fs::read_to_string(fx.dir.path().join("migrations_sqlite").join(&files[0])).unwrap();
    assert_eq!(sql.trim_end(), SchemaBuilder::build_create_statement(&table).unwrap());
}

#[test]
fn test_new_columns_are_added_and_old_rows_survive() {
    let fx = Fixture::new();
    let mut original = fx.model(&users_table());
    original.set("name", "Alice").unwrap();
    original.save().unwrap();

    let extended = Table::new(
        "users",
        Dialect::Sqlite,
        vec![
            ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
            ColumnSpec::new("name", ColumnType::Text).unwrap(),
            ColumnSpec::new("active", ColumnType::Boolean).unwrap(),
            ColumnSpec::new("email", ColumnType::Text).unwrap(),
        ],
    )
    .unwrap();

    let mut model = fx.model(&extended);
    assert_eq!(
        model.ensure_table_exists().unwrap(),
        Some(SyncOutcome::Altered(vec!["email".to_string()]))
    );
    let rows = model.get_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("name"), Some(&Value::from("Alice")));
    assert_eq!(rows[0].get("email"), Some(&Value::Null));

    let files = fx.migration_files();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.starts_with("alter_users_")));
}

#[test]
fn test_failed_create_writes_no_migration_record() {
    let fx = Fixture::new();
    let orphan = Table::new(
        "tags",
        Dialect::Sqlite,
        vec![ColumnSpec::new("label", ColumnType::Text).unwrap()],
    )
    .unwrap();
    let posts = Table::new(
        "posts",
        Dialect::Sqlite,
        vec![
            ColumnSpec::new("id", ColumnType::Integer).unwrap().primary_key(),
            ColumnSpec::new("tag", ColumnType::Text).unwrap().references(&orphan),
        ],
    )
    .unwrap();

    let mut model = fx.model(&posts);
    let err = model.ensure_table_exists().unwrap_err();
    assert!(matches!(err, Error::Schema(ref m) if m.contains("no primary key")));
    assert!(fx.migration_files().is_empty());
}

#[test]
fn test_varchar_without_length_is_configuration_error() {
    let err = ColumnSpec::new("email", ColumnType::Varchar).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

// ============================================================================
// Query cache
// ============================================================================

#[test]
fn test_cached_select_skips_second_round_trip() {
    let fx = Fixture::new();
    let table = users_table();
    let cache: Arc<QueryCache> = Arc::new(QueryCache::new(Duration::from_secs(60)));

    let mut model = fx.model(&table).with_cache(Arc::clone(&cache));
    model.set("name", "Alice").unwrap();
    model.save().unwrap();

    let sql = "SELECT name FROM users WHERE id = ?";
    let first = model.execute_query(sql, &[Value::Int(1)]).unwrap();

    // Remove the row behind the cache's back; a second round trip would see it gone.
    let mut other = fx.model(&table);
    other.load_one(1).unwrap();
    other.delete().unwrap();

    let second = model.execute_query(sql, &[Value::Int(1)]).unwrap();
    assert_eq!(first, vec![vec![Value::from("Alice")]]);
    assert_eq!(second, first);

    cache.clear();
    assert!(model.execute_query(sql, &[Value::Int(1)]).unwrap().is_empty());
}

#[test]
fn test_cache_is_shared_between_models() {
    let fx = Fixture::new();
    let table = users_table();
    let cache: Arc<QueryCache> = Arc::new(QueryCache::new(Duration::from_secs(60)));

    let mut a = fx.model(&table).with_cache(Arc::clone(&cache));
    let mut b = fx.model(&table).with_cache(Arc::clone(&cache));
    a.execute_query("SELECT COUNT(*) FROM users", &[]).unwrap();
    b.execute_query("SELECT COUNT(*) FROM users", &[]).unwrap();
    assert_eq!(cache.len(), 1);
}

// ============================================================================
// Transactions
// ============================================================================

#[test]
fn test_transaction_commits_on_success() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);

    let id = model
        .transaction(|m| {
            m.set("name", "Committed")?;
            m.save()
        })
        .unwrap();

    let mut reader = fx.model(&table);
    assert!(reader.load_one(id).unwrap());
}

#[test]
fn test_transaction_rolls_back_on_error() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);

    let err = model
        .transaction(|m| {
            m.set("name", "Ghost")?;
            m.save()?;
            m.get_all_by(&[Condition::eq("missing", 1)])
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!model.in_transaction());

    let mut reader = fx.model(&table);
    assert!(reader.get_all().unwrap().is_empty());
}

#[test]
fn test_save_after_rolled_back_insert_persists() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);
    model.set("name", "Retry").unwrap();

    let err = model
        .transaction(|m| {
            m.save()?;
            Err::<(), _>(Error::Validation("abort".to_string()))
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    // The identity assigned inside the rolled-back scope is discarded.
    assert_eq!(model.get("id"), Some(&Value::Null));
    assert_eq!(model.get("name"), Some(&Value::from("Retry")));

    let id = model.save().unwrap();
    let mut reader = fx.model(&table);
    assert!(reader.load_one(id).unwrap());
    assert_eq!(reader.get("name"), Some(&Value::from("Retry")));
}

#[test]
fn test_transaction_rolls_back_on_panic() {
    let fx = Fixture::new();
    let table = users_table();
    let mut model = fx.model(&table);

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _: querysmith::Result<()> = model.transaction(|m| {
            m.set("name", "Panicker")?;
            m.save()?;
            panic!("boom");
        });
    }));
    assert!(outcome.is_err());
    assert!(!model.in_transaction());

    let mut reader = fx.model(&table);
    assert!(reader.get_all().unwrap().is_empty());
}

#[test]
fn test_nested_transaction_is_rejected() {
    let fx = Fixture::new();
    let mut model = fx.model(&users_table());
    let err = model
        .transaction(|m| m.transaction(|_| Ok(())))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
