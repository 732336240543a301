//! Resting limit order representation used inside the order book.

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::account::AccountId;
use crate::error::{ensure_positive_amount, MarketResult};
use crate::side::{Funding, Side};

/// Exchange-wide order identifier.
///
/// Ids are handed out from a single increasing counter, so comparing two
/// ids also tells which order arrived first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated limit price, usable as an ordered map key.
///
/// Construction rejects NaN, infinities and non-positive values, so the
/// total order below agrees with the numeric one.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> MarketResult<Self> {
        ensure_positive_amount("limit price", value)?;
        Ok(Price(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Price {}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// A single resting order in the book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub symbol: String,

    pub price: Price,
    /// Original quantity.
    pub quantity: u32,
    /// Remaining unfilled quantity.
    pub remaining: u32,
    pub side: Side,
    pub funding: Funding,

    /// Submission time, nanoseconds since epoch.
    pub timestamp_ns: u64,
}

impl Order {
    pub fn new(
        id: OrderId,
        account: AccountId,
        symbol: impl Into<String>,
        side: Side,
        price: Price,
        quantity: u32,
        funding: Funding,
    ) -> Self {
        Order {
            id,
            account,
            symbol: symbol.into(),
            price,
            quantity,
            remaining: quantity,
            side,
            funding,
            timestamp_ns: current_timestamp_ns(),
        }
    }

    /// Returns `true` if the order is fully filled.
    pub fn is_filled(&self) -> bool {
        self.remaining == 0
    }

    /// Fill the order by up to `qty` units, returning the amount filled.
    pub fn fill(&mut self, qty: u32) -> u32 {
        let filled = qty.min(self.remaining);
        self.remaining -= filled;
        filled
    }
}

/// Current time in nanoseconds since the Unix epoch.
pub fn current_timestamp_ns() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs()
        .saturating_mul(1_000_000_000)
        .saturating_add(now.subsec_nanos() as u64)
}
