//! `sync` command.

use crate::config::QuerySmithConfig;
use crate::schema::{MigrationWriter, SchemaDefinition, SyncOutcome, sync_table};
use crate::storage::{AnyConnector, ConnectionManager};
use crate::Result;
use std::fmt::Write;

/// Synchronises every table of `schema` with the configured database.
///
/// Tables are processed in file order over one connection, so referenced
/// tables exist before the tables that reference them.
///
/// # Errors
///
/// Returns [`crate::Error::Configuration`] without a configured database,
/// and any schema or execution error; tables processed before the failure
/// stay synchronised.
pub fn sync_schema(
    schema: &SchemaDefinition,
    config: &QuerySmithConfig,
    migrations: &MigrationWriter,
) -> Result<Vec<(String, SyncOutcome)>> {
    let database = config.require_database()?;
    let tables = schema.build(database.dialect())?;
    let connector = AnyConnector::from_config(database)?;
    let mut manager = ConnectionManager::new(connector, database.retry());

    let mut report = Vec::with_capacity(tables.len());
    for table in &tables {
        let outcome = sync_table(&mut manager, table, migrations)?;
        report.push((table.name().to_string(), outcome));
    }
    manager.close();
    Ok(report)
}

/// One line per table.
#[must_use]
pub fn render_report(report: &[(String, SyncOutcome)]) -> String {
    let mut out = String::new();
    for (table, outcome) in report {
        let _ = match outcome {
            SyncOutcome::Created => writeln!(out, "{table}: created"),
            SyncOutcome::Altered(columns) => {
                writeln!(out, "{table}: added {}", columns.join(", "))
            },
            SyncOutcome::UpToDate => writeln!(out, "{table}: up to date"),
        };
    }
    out
}
