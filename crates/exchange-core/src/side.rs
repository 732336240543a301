//! Side (Buy / Sell) for orders and top-of-book.

use serde::{Deserialize, Serialize};

/// Order side: Buy or Sell.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Single-char representation (`'B'` / `'S'`), used by the CSV codec.
    pub fn as_char(self) -> char {
        match self {
            Side::Buy => 'B',
            Side::Sell => 'S',
        }
    }

    /// Try to parse from a char (`'B'` / `'S'`, case-insensitive).
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'B' => Some(Side::Buy),
            'S' => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Which pool pays for a buy order.
///
/// Cash-funded orders draw on the cash balance; margin-funded orders draw
/// on the margin pool and add the filled notional to debt. Sell orders are
/// always `Cash` (proceeds are credited to cash).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Funding {
    #[default]
    Cash,
    Margin,
}

impl Funding {
    pub fn as_char(self) -> char {
        match self {
            Funding::Cash => 'C',
            Funding::Margin => 'M',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Funding::Cash),
            'M' => Some(Funding::Margin),
            _ => None,
        }
    }
}
