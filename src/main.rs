//! gatehouse: a pluggable HTTP gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net (admission gate) ──▶ http server ──▶ routing table
//!                                                                   │
//!                      ┌────────────────────────────────────────────┘
//!                      ▼
//!                 pipeline: injectors → interceptors → security
//!                           → interceptors → terminal handler
//!                                                 │
//!             ┌───────────────────┬───────────────┴────────┐
//!             ▼                   ▼                        ▼
//!         service plugin     static files        proxy dispatcher
//!                                                 (load_balancer) ──▶ Backend
//!
//!     Cross-cutting: config, observability, lifecycle
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use gatehouse::config::{load_config, GatewayConfig};
use gatehouse::lifecycle::{self, Shutdown};
use gatehouse::observability;
use gatehouse::plugins::PluginSet;

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Pluggable HTTP gateway", long_about = None)]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted.
    #[arg(env = "GATEHOUSE_CONF")]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_configuration: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    if cli.print_configuration {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    observability::init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatehouse starting");
    match &cli.config {
        Some(path) => tracing::info!(path = %path.display(), "Configuration loaded"),
        None => tracing::warn!("No configuration file given, using defaults"),
    }

    if config.metrics.enabled {
        match config.metrics.listen_address.parse() {
            Ok(addr) => observability::init_metrics(addr)?,
            Err(err) => tracing::error!(
                metrics_address = %config.metrics.listen_address,
                error = %err,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Arc::new(Shutdown::new());
    lifecycle::spawn_signal_listener(shutdown.clone());

    let plugins = PluginSet::builtin(&config);
    if let Err(err) = lifecycle::run(config, plugins, shutdown).await {
        tracing::error!(error = %err, "Gateway failed");
        return Err(err.into());
    }
    Ok(())
}
