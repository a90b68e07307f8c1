//! PipeSync CLI
//!
//! Command-line tools for managing pipes and pushing data through them.
//!
//! # Commands
//!
//! - `register` - Add pipes from a JSON definition file
//! - `show` - List registered pipes and their schemas
//! - `sync` - Push rows from a JSON file into a pipe
//! - `plan` - Render the SQL a sync would run, without a backend

mod commands;
mod store;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PipeSync command-line pipe tools.
#[derive(Parser)]
#[command(name = "pipesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the pipe store file
    #[arg(global = true, short, long, default_value = "pipesync.json")]
    store: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add pipes from a JSON definition file
    Register {
        /// JSON file holding an array of pipe definitions
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List registered pipes and their schemas
    Show {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Push rows from a JSON file into a pipe
    Sync {
        /// The pipe, as connector:metric[:location]
        pipe: String,

        /// JSON file holding an array of row objects
        #[arg(short, long)]
        rows: PathBuf,

        /// Rows per chunk
        #[arg(short, long, default_value = "900")]
        chunksize: usize,

        /// Worker threads for independent chunks
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Skip the diff and insert every row
        #[arg(long)]
        insert_only: bool,
    },

    /// Render the SQL a sync would run, without a backend
    Plan {
        /// The pipe, as connector:metric[:location]
        pipe: String,

        /// JSON file holding an array of row objects
        #[arg(short, long)]
        rows: PathBuf,

        /// Target dialect (postgres, timescale, citus, cockroach,
        /// mysql, mariadb, mssql, oracle, sqlite, duckdb)
        #[arg(short, long, default_value = "postgres")]
        flavor: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Register { file } => {
            commands::register::run(&cli.store, &file)?;
        }
        Commands::Show { format } => {
            commands::show::run(&cli.store, &format)?;
        }
        Commands::Sync {
            pipe,
            rows,
            chunksize,
            workers,
            insert_only,
        } => {
            commands::sync::run(&cli.store, &pipe, &rows, chunksize, workers, insert_only)?;
        }
        Commands::Plan { pipe, rows, flavor } => {
            commands::plan::run(&cli.store, &pipe, &rows, &flavor)?;
        }
        Commands::Version => {
            println!("PipeSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
