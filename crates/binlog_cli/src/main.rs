//! binlog CLI
//!
//! Command-line tools for binlog event logs.
//!
//! # Commands
//!
//! - `serve` - Append everything written to a Unix socket
//! - `append` - Append standard input as one entry
//! - `readers` - List, register, unregister and clone readers
//! - `status` - Show entry counts and per-reader backlog
//! - `dump` - Print entries, optionally as seen by a reader
//! - `purge` - Delete entries every reader has acknowledged

mod commands;

use binlog_core::{ConnectionRegistry, LogConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// binlog command-line tools.
#[derive(Parser)]
#[command(name = "binlog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the log directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen on a Unix socket and append each connection's bytes as one entry
    Serve {
        /// Socket path to create
        socket: PathBuf,
    },

    /// Append standard input as one entry
    Append,

    /// Manage readers
    Readers {
        #[command(subcommand)]
        action: ReadersAction,
    },

    /// Show entry counts and per-reader backlog
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print entries
    Dump {
        /// Only show entries this reader has not acknowledged
        #[arg(short, long)]
        reader: Option<String>,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Newest entries first
        #[arg(long)]
        reverse: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Delete entries acknowledged by every reader
    Purge {
        /// Entries deleted per transaction
        #[arg(short, long)]
        chunk_size: Option<usize>,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum ReadersAction {
    /// List registered readers
    List,
    /// Register a reader
    Register {
        /// Reader name, with `.` separating hierarchy levels
        name: String,
    },
    /// Unregister a reader and its children
    Unregister {
        /// Reader name
        name: String,
    },
    /// Copy a reader's acknowledgments to a new reader
    Clone {
        /// Existing reader
        source: String,
        /// New reader
        destination: String,
    },
}

/// The CLI opens logs with whatever indexes they were created with.
fn log_config() -> LogConfig {
    LogConfig::new().adopt_indexes(true)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("binlog CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("binlog core v{}", binlog_core::VERSION);
        return Ok(());
    }

    let path = cli.path.ok_or("Log path required (--path)")?;
    let registry = ConnectionRegistry::new();
    let conn = registry.open(&path, log_config())?;

    match cli.command {
        Commands::Serve { socket } => commands::serve::run(&conn, &socket)?,
        Commands::Append => commands::append::run(&conn)?,
        Commands::Readers { action } => match action {
            ReadersAction::List => commands::readers::list(&conn)?,
            ReadersAction::Register { name } => commands::readers::register(&conn, &name)?,
            ReadersAction::Unregister { name } => commands::readers::unregister(&conn, &name)?,
            ReadersAction::Clone {
                source,
                destination,
            } => commands::readers::clone(&conn, &source, &destination)?,
        },
        Commands::Status { format } => commands::status::run(&conn, &format)?,
        Commands::Dump {
            reader,
            limit,
            reverse,
            format,
        } => commands::dump::run(&conn, reader.as_deref(), limit, reverse, &format)?,
        Commands::Purge { chunk_size } => commands::purge::run(&conn, chunk_size)?,
        Commands::Version => {}
    }

    Ok(())
}
