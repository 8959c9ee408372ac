//! Schema management: type mapping, DDL generation, synchronisation
//! against a live database, migration records and declarative
//! definitions.

pub mod definition;
mod ddl;
pub mod migrations;
pub mod sync;
mod types;

pub use ddl::SchemaBuilder;
pub use definition::SchemaDefinition;
pub use migrations::{MigrationKind, MigrationWriter};
pub use sync::{SyncOutcome, sync_table};
pub use types::TypeMapper;
