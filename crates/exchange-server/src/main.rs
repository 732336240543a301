//! Binary TCP server for the simulated exchange.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use exchange_server::config::{load_exchange_config, Config};
use exchange_server::server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "exchange-server")]
#[clap(about = "Simulated stock exchange over TCP (CSV or JSON lines)")]
struct Cli {
    /// Interface to bind (overrides EXCHANGE_BIND_ADDR)
    #[clap(short, long)]
    bind: Option<String>,

    /// TCP port (overrides EXCHANGE_PORT)
    #[clap(short, long)]
    port: Option<u16>,

    /// Maximum concurrent clients (overrides EXCHANGE_MAX_CLIENTS)
    #[clap(long)]
    max_clients: Option<usize>,

    /// Price-feed tick interval in ms (overrides EXCHANGE_TICK_MS)
    #[clap(long)]
    tick_ms: Option<u64>,

    /// TOML market description (overrides EXCHANGE_CONFIG)
    #[clap(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    if let Some(path) = cli.config {
        let tick_interval_ms = config.exchange.tick_interval_ms;
        config.exchange = load_exchange_config(&path)?;
        if std::env::var("EXCHANGE_TICK_MS").is_ok() {
            config.exchange.tick_interval_ms = tick_interval_ms;
        }
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(max_clients) = cli.max_clients {
        config.max_clients = max_clients;
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.exchange.tick_interval_ms = tick_ms;
    }
    config.validate()?;

    info!(
        addr = %config.socket_addr_string(),
        max_clients = config.max_clients,
        tick_ms = config.exchange.tick_interval_ms,
        instruments = config.exchange.instruments.len(),
        "starting exchange-server"
    );

    server::run(config).await
}
