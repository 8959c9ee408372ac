//! Data models for querysmith.
//!
//! The dialect-independent table model: dialects, abstract column types,
//! table definitions and the runtime values that flow through them.

mod column;
mod dialect;
mod table;
mod value;

pub use column::{ColumnSpec, ColumnType, validate_identifier};
pub use dialect::{Dialect, PlaceholderStyle};
pub use table::{Record, Table};
pub use value::Value;
