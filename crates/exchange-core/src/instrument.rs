//! A tradable instrument and its price history.

use serde::{Deserialize, Serialize};

/// Price state of one instrument.
///
/// `price` and the last element of `history` always agree; they are only
/// ever updated together through [`Instrument::update_price`].
#[derive(Debug, Clone, PartialEq)]
pub struct Instrument {
    symbol: String,
    price: f64,
    history: Vec<f64>,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Instrument {
            symbol: symbol.into(),
            price,
            history: vec![price],
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn history(&self) -> &[f64] {
        &self.history
    }

    pub fn update_price(&mut self, price: f64) {
        self.price = price;
        self.history.push(price);
    }

    pub fn quote(&self) -> Quote {
        Quote {
            symbol: self.symbol.clone(),
            price: self.price,
        }
    }
}

/// Point-in-time price of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
}

/// Highest- and lowest-priced instruments at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalytics {
    pub top_performer: Quote,
    pub worst_performer: Quote,
}
