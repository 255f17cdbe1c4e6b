//! driftlog CLI
//!
//! Runs a replicating log node and inspects log directories.
//!
//! # Commands
//!
//! - `agent` - Run a node until interrupted
//! - `inspect` - Display segment layout of a log directory
//! - `dump` - Print the records of a log directory

mod commands;

use clap::{Args, Parser, Subcommand};
use driftlog_core::Config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// driftlog command-line tools.
#[derive(Parser)]
#[command(name = "driftlog")]
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

/// Segment limits shared by every command that opens a log.
#[derive(Args, Clone, Copy)]
struct LogArgs {
    /// Store size at which a segment rolls over
    #[arg(long, default_value_t = driftlog_core::DEFAULT_MAX_STORE_BYTES)]
    max_store_bytes: u64,

    /// Index capacity of each segment in bytes
    #[arg(long, default_value_t = driftlog_core::DEFAULT_MAX_INDEX_BYTES)]
    max_index_bytes: u64,
}

impl LogArgs {
    fn config(self) -> Config {
        Config::new()
            .max_store_bytes(self.max_store_bytes)
            .max_index_bytes(self.max_index_bytes)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node until interrupted
    Agent {
        /// Unique node name
        #[arg(short, long)]
        name: String,

        /// Gossip listen address
        #[arg(short, long, default_value = "127.0.0.1:8401")]
        bind: SocketAddr,

        /// Log server port on the gossip host (0 picks a free port)
        #[arg(short, long, default_value_t = 8400)]
        rpc_port: u16,

        /// Gossip address of an existing member (repeatable)
        #[arg(short, long)]
        join: Vec<SocketAddr>,

        /// Subject used when replicating from peers
        #[arg(long)]
        peer_subject: Option<String>,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Display segment layout of a log directory
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Print the records of a log directory
    Dump {
        /// Maximum number of records to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Start from this offset
        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Agent {
            name,
            bind,
            rpc_port,
            join,
            peer_subject,
            log,
        } => {
            let path = cli.path.ok_or("Log path required for agent")?;
            let options = commands::agent::AgentOptions {
                name,
                data_dir: path,
                bind,
                rpc_port,
                join,
                peer_subject,
                log: log.config(),
            };
            commands::agent::run(options)?;
        }
        Commands::Inspect { format, log } => {
            let path = cli.path.ok_or("Log path required for inspect")?;
            commands::inspect::run(&path, log.config(), &format)?;
        }
        Commands::Dump {
            limit,
            offset,
            format,
            log,
        } => {
            let path = cli.path.ok_or("Log path required for dump")?;
            commands::dump::run(&path, log.config(), offset, limit, &format)?;
        }
        Commands::Version => {
            println!("driftlog CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("driftlog core v{}", driftlog_core::VERSION);
        }
    }

    Ok(())
}
