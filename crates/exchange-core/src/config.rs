//! Market configuration.
//!
//! The server loads this from a TOML file (see `exchange-server`); tests
//! usually start from [`ExchangeConfig::default`] and tweak a field or two.

use serde::{Deserialize, Serialize};

/// Initial listing for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSeed {
    pub symbol: String,
    pub price: f64,
}

impl InstrumentSeed {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        InstrumentSeed {
            symbol: symbol.into(),
            price,
        }
    }
}

/// Parameters of a simulated market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Instruments listed at startup, in display order.
    pub instruments: Vec<InstrumentSeed>,

    /// Half-width of the uniform random-walk step applied on every tick.
    pub volatility: f64,

    /// Prices never go below this value.
    pub price_floor: f64,

    /// Cash credited to an account registered without an explicit amount.
    pub starting_cash: f64,

    /// Margin pool size as a multiple of the opening cash balance.
    pub margin_multiplier: f64,

    /// Period of the background price feed, in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            instruments: vec![
                InstrumentSeed::new("AAPL", 150.0),
                InstrumentSeed::new("TSLA", 800.0),
                InstrumentSeed::new("GOOG", 2800.0),
                InstrumentSeed::new("MSFT", 300.0),
            ],
            volatility: 5.0,
            price_floor: 0.01,
            starting_cash: 10_000.0,
            margin_multiplier: 2.0,
            tick_interval_ms: 5_000,
        }
    }
}
