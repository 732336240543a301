//! Simulated price feed.
//!
//! Owns the canonical price of every listed instrument and advances it by a
//! bounded random walk. Each instrument sits behind its own `RwLock`, so a
//! reader always observes a consistent `(price, history)` pair: either the
//! state before a tick or the state after it.
//!
//! The set of instruments is fixed at construction, which lets the map
//! itself stay lock-free; only the per-instrument state is guarded.

use indexmap::IndexMap;
use parking_lot::RwLock;
use rand::Rng;
use tracing::debug;

use crate::config::ExchangeConfig;
use crate::error::{ensure_positive_amount, MarketError, MarketResult};
use crate::instrument::{Instrument, MarketAnalytics, Quote};

#[derive(Debug)]
pub struct PriceFeed {
    /// Symbol -> instrument, in listing order.
    instruments: IndexMap<String, RwLock<Instrument>>,
    volatility: f64,
    price_floor: f64,
}

impl PriceFeed {
    /// Build a feed from the configured listings.
    ///
    /// Duplicate symbols keep the first listing; seed prices are clamped to
    /// the floor like any other price.
    pub fn new(config: &ExchangeConfig) -> Self {
        let price_floor = if config.price_floor.is_finite() && config.price_floor > 0.0 {
            config.price_floor
        } else {
            0.01
        };

        let mut instruments = IndexMap::new();
        for seed in &config.instruments {
            if instruments.contains_key(&seed.symbol) {
                continue;
            }
            let price = clamp_price(seed.price, price_floor);
            instruments.insert(
                seed.symbol.clone(),
                RwLock::new(Instrument::new(seed.symbol.clone(), price)),
            );
        }

        PriceFeed {
            instruments,
            volatility: clamp_volatility(config.volatility),
            price_floor,
        }
    }

    /// Advance every instrument by one random-walk step.
    ///
    /// Returns the new quotes in listing order. Never fails: a step that
    /// would leave the price at or below zero is clamped to the floor.
    pub fn tick<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Quote> {
        let mut quotes = Vec::with_capacity(self.instruments.len());

        for cell in self.instruments.values() {
            let change = if self.volatility > 0.0 {
                rng.gen_range(-self.volatility..=self.volatility)
            } else {
                0.0
            };

            let mut instrument = cell.write();
            let next = clamp_price(instrument.price() + change, self.price_floor);
            instrument.update_price(next);
            quotes.push(instrument.quote());
        }

        debug!(instruments = quotes.len(), "price feed ticked");
        quotes
    }

    /// Latest price of `symbol`.
    pub fn current_price(&self, symbol: &str) -> MarketResult<f64> {
        Ok(self.instrument(symbol)?.read().price())
    }

    pub fn quote(&self, symbol: &str) -> MarketResult<Quote> {
        Ok(self.instrument(symbol)?.read().quote())
    }

    /// Snapshot of all quotes, in listing order.
    pub fn quotes(&self) -> Vec<Quote> {
        self.instruments.values().map(|cell| cell.read().quote()).collect()
    }

    /// Copy of the full price history of `symbol`.
    pub fn history(&self, symbol: &str) -> MarketResult<Vec<f64>> {
        Ok(self.instrument(symbol)?.read().history().to_vec())
    }

    /// Force a price (admin / deterministic tests). Appends to history.
    pub fn set_price(&self, symbol: &str, price: f64) -> MarketResult<()> {
        ensure_positive_amount("price", price)?;
        let cell = self.instrument(symbol)?;
        cell.write().update_price(clamp_price(price, self.price_floor));
        Ok(())
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(String::as_str)
    }

    /// Highest- and lowest-priced instruments, or `None` for an empty market.
    pub fn analytics(&self) -> Option<MarketAnalytics> {
        let quotes = self.quotes();
        let top = quotes
            .iter()
            .max_by(|a, b| a.price.total_cmp(&b.price))?
            .clone();
        let worst = quotes
            .iter()
            .min_by(|a, b| a.price.total_cmp(&b.price))?
            .clone();

        Some(MarketAnalytics {
            top_performer: top,
            worst_performer: worst,
        })
    }

    fn instrument(&self, symbol: &str) -> MarketResult<&RwLock<Instrument>> {
        self.instruments
            .get(symbol)
            .ok_or_else(|| MarketError::unknown_symbol(symbol))
    }
}

/// Largest step half-width; `gen_range(-v..=v)` needs `2v` to be finite.
const MAX_VOLATILITY: f64 = f64::MAX / 4.0;

/// Non-finite volatility disables the walk; huge values are capped.
fn clamp_volatility(volatility: f64) -> f64 {
    if volatility.is_finite() {
        volatility.abs().min(MAX_VOLATILITY)
    } else {
        0.0
    }
}

fn clamp_price(price: f64, floor: f64) -> f64 {
    if price.is_finite() {
        price.max(floor)
    } else {
        floor
    }
}
