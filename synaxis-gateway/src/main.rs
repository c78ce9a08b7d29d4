//! # Synaxis Gateway Binary
//!
//! Binary entry point: parses CLI flags, loads configuration, and starts
//! the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! synaxis-gateway
//! synaxis-gateway --config my-config.toml
//! synaxis-gateway --host 0.0.0.0 --port 8080
//! synaxis-gateway --log-level debug
//! ```
//!
//! ## Environment Variables
//!
//! See [`synaxis_gateway::config`] for the full list of `SYNAXIS_*`
//! overrides applied on top of the TOML file.

use clap::Parser;
use std::net::SocketAddr;
use synaxis_gateway::{config::Config, server::create_server};

/// Command line arguments for the gateway binary. CLI flags take
/// precedence over the `[server]` section of the loaded config file.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Port number for the HTTP server.
    #[arg(short, long)]
    port: Option<u16>,

    /// Host address to bind the server to.
    #[arg(long)]
    host: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&args.log_level)
        .init();

    let mut config = Config::load(&args.config)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let app = create_server(config).await?;

    tracing::info!(%addr, "starting synaxis-gateway");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
