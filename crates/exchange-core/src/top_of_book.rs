//! Helper types for representing top-of-book state.
//!
//! This is separate from the [`Response::TopOfBook`](crate::messages::Response)
//! event so that the book can keep a small internal snapshot for change
//! detection and queries.

use serde::{Deserialize, Serialize};

/// Best price on one side of the book and the total quantity resting there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: f64,
    pub quantity: u64,
}

/// A simple snapshot of top-of-book for a single symbol.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TopOfBookSnapshot {
    pub bid: Option<Level>,
    pub ask: Option<Level>,
}

impl TopOfBookSnapshot {
    /// Returns `true` if there is *no* bid and *no* ask.
    pub fn is_empty(&self) -> bool {
        self.bid.is_none() && self.ask.is_none()
    }

    /// Returns `true` if the best bid is at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }
}
