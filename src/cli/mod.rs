//! Command-line interface.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `types` | List the abstract column types a dialect supports |
//! | `ddl` | Print CREATE TABLE statements for a schema file |
//! | `sync` | Create or extend the tables of a schema file in a live database |
//!
//! # Example Usage
//!
//! ```bash
//! querysmith types --dialect mysql
//! querysmith ddl --schema schema.toml --dialect postgresql
//! QUERYSMITH_DATABASE_URL=sqlite://app.db querysmith sync --schema schema.toml
//! ```

mod ddl;
mod sync;
mod types;

pub use ddl::render_ddl;
pub use sync::{render_report, sync_schema};
pub use types::render_types;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// `QuerySmith` - dialect-agnostic schema and CRUD toolkit.
#[derive(Debug, Parser)]
#[command(name = "querysmith")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "QUERYSMITH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List supported abstract types and their SQL rendering.
    Types {
        /// Target dialect: postgresql, mysql or sqlite.
        #[arg(short, long)]
        dialect: String,
    },

    /// Print CREATE TABLE statements for a schema file.
    Ddl {
        /// Schema definition file (TOML).
        #[arg(short, long)]
        schema: PathBuf,

        /// Target dialect: postgresql, mysql or sqlite.
        #[arg(short, long)]
        dialect: String,
    },

    /// Create missing tables and add missing columns.
    Sync {
        /// Schema definition file (TOML).
        #[arg(short, long)]
        schema: PathBuf,

        /// Skip writing migration records.
        #[arg(long)]
        no_migrations: bool,
    },
}
