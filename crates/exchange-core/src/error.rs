//! Error types for the market engine.
//!
//! Every trading operation validates its inputs before touching any
//! state, so returning one of these errors always means "nothing
//! changed". The only exception is [`MarketError::Internal`], which
//! signals a broken book/ledger invariant and should be treated as a bug.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What kind of entity a [`MarketError::NotFound`] refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Symbol,
    Account,
    Order,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Symbol => write!(f, "symbol"),
            EntityKind::Account => write!(f, "account"),
            EntityKind::Order => write!(f, "order"),
        }
    }
}

/// Errors returned by the market engine.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum MarketError {
    /// Unknown symbol, account or order.
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("insufficient funds: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient shares of {symbol}: required {required}, available {available}")]
    InsufficientShares {
        symbol: String,
        required: i64,
        available: i64,
    },

    #[error("insufficient margin: required {required:.2}, available {available:.2}")]
    InsufficientMargin { required: f64, available: f64 },

    /// Non-positive or non-finite amount, price or quantity.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("account already registered: {0}")]
    DuplicateAccount(String),

    /// Long-only operation against an open short, or the reverse.
    #[error("conflicting position in {symbol}")]
    PositionConflict { symbol: String },

    /// Book or ledger invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn unknown_symbol(symbol: &str) -> Self {
        MarketError::NotFound {
            kind: EntityKind::Symbol,
            key: symbol.to_string(),
        }
    }

    pub fn unknown_account(key: impl ToString) -> Self {
        MarketError::NotFound {
            kind: EntityKind::Account,
            key: key.to_string(),
        }
    }

    pub fn unknown_order(order_id: u64) -> Self {
        MarketError::NotFound {
            kind: EntityKind::Order,
            key: order_id.to_string(),
        }
    }

    /// Short machine-friendly name, used by the CSV codec.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::NotFound { .. } => "not_found",
            MarketError::InsufficientFunds { .. } => "insufficient_funds",
            MarketError::InsufficientShares { .. } => "insufficient_shares",
            MarketError::InsufficientMargin { .. } => "insufficient_margin",
            MarketError::InvalidAmount(_) => "invalid_amount",
            MarketError::DuplicateAccount(_) => "duplicate_account",
            MarketError::PositionConflict { .. } => "position_conflict",
            MarketError::Internal(_) => "internal",
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

/// Reject non-finite or non-positive monetary values.
pub(crate) fn ensure_positive_amount(what: &str, value: f64) -> MarketResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MarketError::InvalidAmount(format!("{what} must be positive, got {value}")))
    }
}

pub(crate) fn ensure_positive_quantity(quantity: u32) -> MarketResult<()> {
    if quantity == 0 {
        Err(MarketError::InvalidAmount("quantity must be positive".to_string()))
    } else {
        Ok(())
    }
}
