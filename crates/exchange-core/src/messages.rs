//! Message types used by the exchange.
//!
//! These are **transport-agnostic** logical messages:
//! - [`Request`]: what the exchange consumes (one variant per entry point).
//! - [`Response`]: what the exchange produces.
//!
//! Both derive serde so the protocol crate can carry them as JSON lines;
//! the CSV codec maps them by hand.

use serde::{Deserialize, Serialize};

use crate::account::{AccountId, Balances, Portfolio, TransactionRecord};
use crate::error::MarketError;
use crate::indicators::Indicators;
use crate::instrument::{MarketAnalytics, Quote};
use crate::order::OrderId;
use crate::side::{Funding, Side};

/// A request into the exchange.
///
/// Accounts are addressed by username; the exchange resolves it to an
/// [`AccountId`] before touching any state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Open an account; `cash` defaults to the configured starting cash.
    Register {
        username: String,
        #[serde(default)]
        cash: Option<f64>,
    },

    AddFunds {
        username: String,
        amount: f64,
    },

    BuyMarket {
        username: String,
        symbol: String,
        quantity: u32,
    },

    SellMarket {
        username: String,
        symbol: String,
        quantity: u32,
    },

    BuyOnMargin {
        username: String,
        symbol: String,
        quantity: u32,
    },

    ShortSell {
        username: String,
        symbol: String,
        quantity: u32,
    },

    CoverShort {
        username: String,
        symbol: String,
        quantity: u32,
    },

    /// Rest a limit order in the book and run matching.
    SubmitLimit {
        username: String,
        symbol: String,
        side: Side,
        price: f64,
        quantity: u32,
        #[serde(default)]
        funding: Funding,
    },

    Cancel {
        username: String,
        order_id: OrderId,
    },

    Quote {
        symbol: String,
    },

    /// All quotes, in listing order.
    ListMarket,

    Portfolio {
        username: String,
    },

    History {
        username: String,
    },

    TopOfBook {
        symbol: String,
    },

    Analytics,

    Indicators {
        symbol: String,
        period: usize,
    },
}

/// An event emitted by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Registered {
        account: AccountId,
        username: String,
        balances: Balances,
    },

    /// A market-style operation (buy, sell, margin, short, cover, funds)
    /// went through.
    Confirmed(Confirmation),

    /// A limit order passed validation and its escrow was taken.
    OrderAccepted {
        message: String,
        order_id: OrderId,
        symbol: String,
        side: Side,
        price: f64,
        quantity: u32,
        funding: Funding,
        balances: Balances,
    },

    CancelAck {
        order_id: OrderId,
        symbol: String,
        /// Quantity that was still resting when cancelled.
        remaining: u32,
    },

    Trade(Trade),

    /// Top-of-book change or snapshot.
    TopOfBook(TopOfBook),

    Quote(Quote),

    Quotes {
        quotes: Vec<Quote>,
    },

    Portfolio(Portfolio),

    History {
        username: String,
        records: Vec<TransactionRecord>,
    },

    Analytics(MarketAnalytics),

    Indicators(Indicators),

    Rejected {
        error: MarketError,
    },

    /// The request could not be decoded; nothing reached the exchange.
    InvalidRequest {
        reason: String,
    },
}

/// Human-readable confirmation plus the balances after the operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub message: String,
    pub balances: Balances,
}

/// A fill between a resting bid and a resting ask.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,

    pub buy_order: OrderId,
    pub buyer: AccountId,

    pub sell_order: OrderId,
    pub seller: AccountId,

    pub price: f64,
    pub quantity: u32,
}

/// Top-of-book event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub symbol: String,

    /// Side this event refers to (bid or ask).
    pub side: Side,

    /// Best price; meaningless when `eliminated`.
    pub price: f64,

    /// Total quantity at the best price; `0` when `eliminated`.
    pub total_quantity: u64,

    /// True when the side is empty.
    pub eliminated: bool,
}

// -----------------------------------------------------------------------------
// Convenience constructors
// -----------------------------------------------------------------------------

impl Response {
    pub fn confirmed(message: impl Into<String>, balances: Balances) -> Self {
        Response::Confirmed(Confirmation {
            message: message.into(),
            balances,
        })
    }

    pub fn rejected(error: MarketError) -> Self {
        Response::Rejected { error }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Response::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for a non-eliminated top-of-book event.
    pub fn top_of_book(symbol: impl Into<String>, side: Side, price: f64, total_quantity: u64) -> Self {
        Response::TopOfBook(TopOfBook {
            symbol: symbol.into(),
            side,
            price,
            total_quantity,
            eliminated: false,
        })
    }

    /// Convenience constructor for an eliminated top-of-book event.
    pub fn top_of_book_eliminated(symbol: impl Into<String>, side: Side) -> Self {
        Response::TopOfBook(TopOfBook {
            symbol: symbol.into(),
            side,
            price: 0.0,
            total_quantity: 0,
            eliminated: true,
        })
    }

    /// Whether this event is of interest to every connected client rather
    /// than just the requester.
    pub fn is_market_event(&self) -> bool {
        matches!(self, Response::Trade(_) | Response::TopOfBook(_))
    }
}
