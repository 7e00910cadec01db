//! HTTP request relay gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────┐
//!                              │                 RELAY GATEWAY                 │
//!                              │                                               │
//!     POST /proxy              │  ┌─────────┐    ┌──────────────┐             │
//!     ─────────────────────────┼─▶│  http   │───▶│ ProxyGateway │             │
//!                              │  │ server  │    │ (validate,   │             │
//!                              │  └─────────┘    │  budget)     │             │
//!                              │                 └──────┬───────┘             │
//!                              │              ┌─────────┴─────────┐           │
//!                              │              ▼                   ▼           │
//!                              │      ┌──────────────┐   ┌────────────────┐   │
//!                              │      │ DirectRelay  │   │ ScrapeRenderer │   │
//!                              │      │  (reqwest)   │   │ (headless      │   │
//!                              │      └──────┬───────┘   │  Chrome, CDP)  │   │
//!                              │             │           └───────┬────────┘   │
//!     Response                 │             ▼                   ▼            │
//!     ◀────────────────────────┼────── ResponseEnvelope ◀────────┘            │
//!                              │                                               │
//!                              │  config · observability · lifecycle           │
//!                              └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use http_relay::config::validation::validate_config;
use http_relay::config::{load_config, ConfigError, GatewayConfig};
use http_relay::lifecycle::{shutdown_signal, Shutdown};
use http_relay::observability::{logging, metrics};
use http_relay::HttpServer;

#[derive(Parser)]
#[command(name = "http-relay")]
#[command(about = "Relay gateway: forwards requests or renders pages headlessly", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("http-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        budget_ms = config.relay.budget_ms,
        chrome_path = %config.scrape.chrome_path,
        max_browsers = config.scrape.max_browsers,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on(shutdown_signal());

    let server = HttpServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
