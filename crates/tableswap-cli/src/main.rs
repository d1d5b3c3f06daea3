//! tableswap command-line tool
//!
//! Imports entity catalogs, previews swap plans, writes them as numbered
//! scripts and applies scripts forward or backward against a database.

mod commands;
mod error;
mod formatter;
mod script;

use clap::{Parser, Subcommand};
use commands::{ApplyOptions, Context};
use error::CliError;
use formatter::OutputFormat;
use std::path::PathBuf;
use tableswap_core::catalog::EntityIdent;
use tableswap_core::PlanScope;
use tracing_subscriber::EnvFilter;

/// tableswap command-line tool
#[derive(Parser, Debug)]
#[command(name = "tableswap")]
#[command(version, about = "Swap the principal entity of a relational schema")]
pub struct Args {
    /// Catalog database directory
    #[arg(long, global = true, default_value = ".tableswap/catalog")]
    pub catalog: PathBuf,

    /// SQLite database file
    #[arg(long, global = true, default_value = "db.sqlite3")]
    pub database: PathBuf,

    /// Root directory for generated scripts
    #[arg(long, global = true, default_value = "migrations")]
    pub scripts: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage the entity catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// Preview the operations of a swap
    Plan {
        /// Entity being replaced (namespace.Name)
        source: EntityIdent,
        /// Replacement entity (namespace.Name)
        destination: EntityIdent,
        /// Which part of the swap to plan
        #[arg(long, default_value = "full")]
        scope: PlanScope,
    },

    /// Write a script copying rows into the replacement entity
    CreatePopulate {
        /// Entity being replaced
        source: EntityIdent,
        /// Replacement entity
        destination: EntityIdent,
    },

    /// Write a script retargeting foreign keys to the replacement entity
    CreateSchema {
        /// Entity being replaced
        source: EntityIdent,
        /// Replacement entity
        destination: EntityIdent,
    },

    /// Write a script renaming the type registry entry
    CreateTypeTags {
        /// Entity being replaced
        source: EntityIdent,
        /// Replacement entity
        destination: EntityIdent,
    },

    /// Write a script emptying the built-in principal entity
    CreateEmpty {
        /// Replacement entity that refills the principal on rollback
        replacement: EntityIdent,
    },

    /// Run a script against the database
    Apply {
        /// Script file
        script: PathBuf,
        /// Run the backward operations
        #[arg(long)]
        backward: bool,
        /// Rows copied per batch
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
        /// Log the operations without executing them
        #[arg(long)]
        dry_run: bool,
        /// Type registry table
        #[arg(long, default_value = "type_registry")]
        registry_table: String,
        /// Type registry namespace column
        #[arg(long, default_value = "namespace")]
        registry_namespace_column: String,
        /// Type registry name column
        #[arg(long, default_value = "name")]
        registry_name_column: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Import a schema bundle from JSON as the next catalog version
    Import {
        /// Schema JSON file
        file: PathBuf,
    },
    /// Show the current catalog
    Show,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "tableswap=debug,tableswap_core=debug"
    } else {
        "tableswap=info,tableswap_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CliError> {
    let ctx = Context {
        catalog_path: args.catalog,
        database_path: args.database,
        scripts_path: args.scripts,
        format: args.format,
    };

    let output = match args.command {
        Command::Catalog(CatalogCommand::Import { file }) => commands::catalog_import(&ctx, &file)?,
        Command::Catalog(CatalogCommand::Show) => commands::catalog_show(&ctx)?,
        Command::Plan {
            source,
            destination,
            scope,
        } => commands::plan(&ctx, &source, &destination, scope)?,
        Command::CreatePopulate {
            source,
            destination,
        } => commands::create_populate(&ctx, &source, &destination)?,
        Command::CreateSchema {
            source,
            destination,
        } => commands::create_schema(&ctx, &source, &destination)?,
        Command::CreateTypeTags {
            source,
            destination,
        } => commands::create_type_tags(&ctx, &source, &destination)?,
        Command::CreateEmpty { replacement } => commands::create_empty(&ctx, &replacement)?,
        Command::Apply {
            script,
            backward,
            batch_size,
            dry_run,
            registry_table,
            registry_namespace_column,
            registry_name_column,
        } => {
            let options = ApplyOptions {
                backward,
                batch_size,
                dry_run,
                registry_table,
                registry_columns: (registry_namespace_column, registry_name_column),
            };
            commands::apply(&ctx, &script, &options)?
        }
    };

    println!("{}", output);
    Ok(())
}
