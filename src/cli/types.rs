//! `types` command.

use crate::Result;
use crate::models::{ColumnType, Dialect};
use crate::schema::TypeMapper;
use std::fmt::Write;

/// Length shown for types that require one.
const SAMPLE_LENGTH: u32 = 255;

/// One line per supported abstract type: `ABSTRACT  NATIVE`.
///
/// # Errors
///
/// Returns [`crate::Error::Configuration`] for an unknown dialect.
pub fn render_types(dialect: &str) -> Result<String> {
    let dialect = Dialect::parse(dialect)?;
    let mut out = String::new();
    for column_type in TypeMapper::supported_types(dialect) {
        let length = column_type.requires_length().then_some(SAMPLE_LENGTH);
        let native = TypeMapper::map_type(column_type, dialect, length)?;
        let _ = writeln!(out, "{:<10} {native}", column_type.as_str());
    }
    let unsupported: Vec<&str> = ColumnType::all()
        .iter()
        .filter(|ty| !TypeMapper::validate_type(**ty, dialect))
        .map(ColumnType::as_str)
        .collect();
    if !unsupported.is_empty() {
        let _ = writeln!(out, "# unsupported: {}", unsupported.join(", "));
    }
    Ok(out)
}
