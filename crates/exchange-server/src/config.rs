//! Configuration for the exchange TCP server.
//!
//! Defaults can be overridden via environment variables:
//!
//! - `EXCHANGE_BIND_ADDR`   (default: "0.0.0.0")
//! - `EXCHANGE_PORT`        (default: "9000")
//! - `EXCHANGE_MAX_CLIENTS` (default: "1024")
//! - `EXCHANGE_TICK_MS`     (default: the market's `tick_interval_ms`)
//! - `EXCHANGE_CONFIG`      (optional path to a TOML market description)
//!
//! The binary applies command-line flags on top of this.

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use exchange_core::ExchangeConfig;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// Listed instruments, volatility, starting balances, tick interval.
    pub exchange: ExchangeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            max_clients: 1024,
            exchange: ExchangeConfig::default(),
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to reasonable defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let bind_addr = env::var("EXCHANGE_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = read_env_or_default("EXCHANGE_PORT", defaults.port)?;
        let max_clients = read_env_or_default("EXCHANGE_MAX_CLIENTS", defaults.max_clients)?;

        let mut exchange = match env::var("EXCHANGE_CONFIG") {
            Ok(path) => load_exchange_config(&path)?,
            Err(_) => defaults.exchange,
        };
        exchange.tick_interval_ms = read_env_or_default("EXCHANGE_TICK_MS", exchange.tick_interval_ms)?;

        let config = Config {
            bind_addr,
            port,
            max_clients,
            exchange,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.exchange.tick_interval_ms == 0 {
            bail!("tick interval must be at least 1 ms");
        }
        if self.exchange.instruments.is_empty() {
            bail!("at least one instrument must be listed");
        }
        Ok(())
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.exchange.tick_interval_ms)
    }
}

/// Read an [`ExchangeConfig`] from a TOML file. Missing keys take their
/// defaults.
pub fn load_exchange_config(path: impl AsRef<Path>) -> Result<ExchangeConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading market config {}", path.display()))?;
    parse_exchange_config(&text).with_context(|| format!("parsing market config {}", path.display()))
}

pub fn parse_exchange_config(text: &str) -> Result<ExchangeConfig> {
    Ok(toml::from_str(text)?)
}

fn read_env_or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {val:?}")),
        Err(_) => Ok(default),
    }
}
