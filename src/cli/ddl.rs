//! `ddl` command.

use crate::Result;
use crate::models::Dialect;
use crate::schema::{SchemaBuilder, SchemaDefinition};

/// CREATE TABLE statements for every table, in file order.
///
/// # Errors
///
/// Returns [`crate::Error::Configuration`] for an unknown dialect or
/// column type and [`crate::Error::Schema`] for an invalid reference graph.
pub fn render_ddl(schema: &SchemaDefinition, dialect: &str) -> Result<String> {
    let dialect = Dialect::parse(dialect)?;
    let tables = schema.build(dialect)?;
    let statements = tables
        .iter()
        .map(|table| SchemaBuilder::build_create_statement(table))
        .collect::<Result<Vec<_>>>()?;
    Ok(statements.join("\n\n") + "\n")
}
