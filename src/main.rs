//! Canary Router
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ panic guard ──▶ routing engine
//!                     (request id,                     │
//!                      tracing,            X-Canary? ──┼──▶ main / canary
//!                      timeouts)                       │
//!                                          decision ───┤  (body replayed,
//!                                          service     │   status read)
//!                                                      ▼
//!                                          canary quota ──▶ main / canary
//!                                                      │
//!     Client Response ◀──────────────── forwarding proxy ◀── Backend
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use canary_router::config::load_config;
use canary_router::lifecycle::{spawn_signal_handler, Shutdown};
use canary_router::observability::{logging, metrics};
use canary_router::HttpServer;

#[derive(Parser)]
#[command(name = "canary-router")]
#[command(about = "Routes traffic between a main and a canary deployment", version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "CANARY_ROUTER_CONFIG", default_value = "canary-router.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    logging::init_logging(&config.observability);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "canary-router starting"
    );
    tracing::info!(
        bind_address = %config.server.bind_address,
        main = %config.main.url,
        canary = %config.canary.url,
        sidecar_enabled = config.sidecar.is_enabled(),
        request_limit_canary = config.circuit_breaker.request_limit_canary,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config, env!("CARGO_PKG_VERSION"))?;

    let listener = TcpListener::bind(&server.config().server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
