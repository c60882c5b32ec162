//! dispatch-proxy
//!
//! Host-based reverse proxy driven by a friendly route configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!     config file ──▶ loader ──▶ normalize ──▶ socket buckets
//!                      ▲                            │
//!                      │ (--watch)                  ▼
//!                   watcher              ┌─────────────────────┐
//!                                        │ per socket:         │
//!     Client Request ───────────────────▶│  auth table         │
//!                                        │  redirect table ────┼──▶ 302
//!                                        │  proxy table ───────┼──▶ Backend
//!                                        │  (no match) ────────┼──▶ 404
//!                                        └─────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use dispatch_proxy::config::loader::load_normalized;
use dispatch_proxy::config::watcher::ConfigWatcher;
use dispatch_proxy::config::{NormalizeOptions, PortlessPolicy};
use dispatch_proxy::http::ProxyServer;
use dispatch_proxy::lifecycle::Shutdown;
use dispatch_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "dispatch-proxy")]
#[command(about = "Host-based reverse proxy", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, default_value = "proxy.toml")]
    config: PathBuf,

    /// Log level for the proxy; RUST_LOG takes precedence
    #[arg(long)]
    log_level: Option<String>,

    /// Place routes without a port on the http listeners only
    #[arg(long)]
    http_only_portless: bool,

    /// Port for portless routes when no listener is declared
    #[arg(long, default_value_t = 80)]
    fallback_port: u16,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured sockets
    Run {
        /// Reload routes when the configuration file changes
        #[arg(long)]
        watch: bool,
    },
    /// Print the normalized configuration as JSON
    Normalize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref());

    let options = NormalizeOptions {
        portless: if cli.http_only_portless {
            PortlessPolicy::HttpOnly
        } else {
            PortlessPolicy::AllListeners
        },
        fallback_port: cli.fallback_port,
    };

    let normalized = load_normalized(&cli.config, &options)?;

    match cli.command.unwrap_or(Commands::Run { watch: false }) {
        Commands::Normalize => {
            println!("{}", serde_json::to_string_pretty(&normalized)?);
        }
        Commands::Run { watch } => {
            tracing::info!(
                config = %cli.config.display(),
                sockets = normalized.ports.len(),
                "dispatch-proxy v{} starting",
                env!("CARGO_PKG_VERSION")
            );

            let server = ProxyServer::new(&normalized)?;

            // The watcher handle must outlive the server loop.
            let (_watcher, updates) = if watch {
                let (watcher, updates) = ConfigWatcher::new(&cli.config, options);
                (Some(watcher.run()?), updates)
            } else {
                let (_, updates) = mpsc::unbounded_channel();
                (None, updates)
            };

            let shutdown = Arc::new(Shutdown::new());
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move { shutdown.trigger_on_ctrl_c().await }
            });

            server.run(updates, &shutdown).await?;
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
