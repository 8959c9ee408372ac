//! Binary entry point for querysmith.
//!
//! This binary provides schema inspection and synchronisation commands on
//! top of the querysmith library.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::Parser;
use querysmith::cli::{self, Cli, Commands};
use querysmith::config::QuerySmithConfig;
use querysmith::observability;
use querysmith::schema::{MigrationWriter, SchemaDefinition};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match QuerySmithConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init(&config.logging, cli.verbose) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, &config) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command and returns its standard output.
fn run_command(cli: Cli, config: &QuerySmithConfig) -> anyhow::Result<String> {
    match cli.command {
        Commands::Types { dialect } => Ok(cli::render_types(&dialect)?),

        Commands::Ddl { schema, dialect } => {
            let definition = SchemaDefinition::load(&schema)
                .with_context(|| format!("loading schema {}", schema.display()))?;
            Ok(cli::render_ddl(&definition, &dialect)?)
        },

        Commands::Sync {
            schema,
            no_migrations,
        } => {
            let definition = SchemaDefinition::load(&schema)
                .with_context(|| format!("loading schema {}", schema.display()))?;
            let migrations = if no_migrations {
                MigrationWriter::disabled()
            } else {
                MigrationWriter::new(config.migrations.clone())
            };
            let report = cli::sync_schema(&definition, config, &migrations)
                .context("schema synchronisation failed")?;
            Ok(cli::render_report(&report))
        },
    }
}
