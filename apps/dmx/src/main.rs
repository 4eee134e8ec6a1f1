//! # DMX Server
//!
//! The main binary for the DMX hypergraph.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - Websocket push of change directives
//! - CLI interface for inspecting a database
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 apps/dmx (THE BINARY)                │
//! │                                                      │
//! │  ┌─────────┐   ┌──────────────┐   ┌───────────────┐  │
//! │  │  CLI    │   │   HTTP API   │   │   Websocket   │  │
//! │  │ (clap)  │   │    (axum)    │   │   registry    │  │
//! │  └────┬────┘   └──────┬───────┘   └───────┬───────┘  │
//! │       └───────────────┼───────────────────┘          │
//! │                       ▼                              │
//! │               ┌──────────────┐                       │
//! │               │   dmx-core   │                       │
//! │               │ (THE MODEL)  │                       │
//! │               └──────────────┘                       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! dmx serve --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! dmx init
//! dmx status
//! dmx topic 42 --children
//! dmx type dmx.core.topic_type
//! ```

use clap::Parser;
use dmx::cli;
use dmx::config::{Config, LogFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    init_tracing(config.log.effective_format(), cli.verbose);

    if let Err(e) = cli::execute(cli, config).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing. `RUST_LOG` wins over the default filter.
fn init_tracing(format: LogFormat, verbose: bool) {
    let default_filter = if verbose {
        "dmx=debug,dmx_core=debug,tower_http=debug"
    } else {
        "dmx=info,dmx_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
}
