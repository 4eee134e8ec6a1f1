//! # DMX CLI Module
//!
//! This module implements the CLI interface for DMX.
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server
//! - `init` - Bootstrap a new database
//! - `status` - Show object counts
//! - `topic` - Print a topic as JSON
//! - `type` - Print a topic type or association type as JSON

mod commands;

use crate::config::{Backend, Config};
use clap::{Parser, Subcommand};
use dmx_core::DmxError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// DMX - a typed hypergraph of topics and associations.
#[derive(Parser, Debug)]
#[command(name = "dmx")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the TOML config file (default: dmx.toml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the database (overrides [storage] path)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" or "memory" (overrides [storage] backend)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<Backend>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Serve {
        /// Host to bind to (overrides [server] host)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides [server] port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Bootstrap a new database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show object counts
    Status,

    /// Print a topic as JSON
    Topic {
        /// Topic id
        id: u64,

        /// Load the composite tree
        #[arg(long)]
        children: bool,
    },

    /// Print a type as JSON
    Type {
        /// Type URI
        uri: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Apply the global flags on top of the file configuration.
#[must_use]
pub fn effective_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(path) = &cli.database {
        config.storage.path.clone_from(path);
    }
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    if let Some(Commands::Serve { host, port }) = &cli.command {
        if let Some(host) = host {
            config.server.host.clone_from(host);
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }
    config
}

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli, config: Config) -> Result<(), DmxError> {
    let config = effective_config(&cli, config);
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Serve { .. }) => cmd_serve(&config).await,
        Some(Commands::Init { force }) => cmd_init(&config.storage, force, json_mode),
        Some(Commands::Topic { id, children }) => cmd_topic(&config.storage, id, children),
        Some(Commands::Type { uri }) => cmd_type(&config.storage, &uri),
        Some(Commands::Status) | None => cmd_status(&config.storage, json_mode),
    }
}
