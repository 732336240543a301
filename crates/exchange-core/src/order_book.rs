//! Single-symbol limit order book with price-time priority.
//!
//! - One instance per symbol.
//! - Bids: best = highest price.
//! - Asks: best = lowest price.
//! - FIFO within each price level; since order ids come from one
//!   increasing counter, the front of a level is always the oldest order.
//!
//! The book only stores orders. Crossing and settlement are driven from
//! outside by [`matching_engine`](crate::matching_engine), which peeks the
//! best orders and consumes them through [`OrderBook::fill_best`].
//!
//! Cancellation does a linear search over the relevant side; books in
//! this simulator are shallow.

use std::collections::{BTreeMap, VecDeque};

use crate::account::AccountId;
use crate::error::{MarketError, MarketResult};
use crate::messages::Response;
use crate::order::{Order, OrderId, Price};
use crate::side::Side;
use crate::top_of_book::{Level, TopOfBookSnapshot};

type Levels = BTreeMap<Price, VecDeque<Order>>;

#[derive(Debug)]
pub struct OrderBook {
    symbol: String,

    /// Bids: price -> FIFO queue of orders at that price.
    ///
    /// Keys are sorted ascending; the highest key is the best bid.
    bids: Levels,

    /// Asks: price -> FIFO queue of orders at that price.
    ///
    /// Keys are sorted ascending; the lowest key is the best ask.
    asks: Levels,

    /// Last published top-of-book, for change detection.
    prev_top: TopOfBookSnapshot,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        OrderBook {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            prev_top: TopOfBookSnapshot::default(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Rest an order at the back of its price level.
    ///
    /// Buys go to the bid side and sells to the ask side; the side decides
    /// the collection, so a bid can never end up among the asks.
    pub fn insert(&mut self, order: Order) {
        debug_assert_eq!(order.symbol, self.symbol);
        debug_assert!(!order.is_filled());

        let levels = match order.side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        levels.entry(order.price).or_default().push_back(order);
    }

    /// Remove an order by id, returning it if it was resting.
    pub fn cancel(&mut self, order_id: OrderId) -> Option<Order> {
        remove_from_side(&mut self.bids, order_id).or_else(|| remove_from_side(&mut self.asks, order_id))
    }

    /// Look up a resting order without removing it.
    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders().find(|o| o.id == order_id)
    }

    /// Highest bid (oldest at its price).
    pub fn best_bid(&self) -> Option<&Order> {
        self.bids.values().next_back().and_then(|level| level.front())
    }

    /// Lowest ask (oldest at its price).
    pub fn best_ask(&self) -> Option<&Order> {
        self.asks.values().next().and_then(|level| level.front())
    }

    /// Reduce the best order on `side` by `qty`, dropping it (and its level)
    /// once nothing remains. Returns the order's remaining quantity.
    ///
    /// Filling more than the order has left is an internal error.
    pub fn fill_best(&mut self, side: Side, qty: u32) -> MarketResult<u32> {
        let (levels, best_price) = match side {
            Side::Buy => {
                let price = self.bids.keys().next_back().copied();
                (&mut self.bids, price)
            }
            Side::Sell => {
                let price = self.asks.keys().next().copied();
                (&mut self.asks, price)
            }
        };

        let price = best_price.ok_or_else(|| {
            MarketError::Internal(format!("fill on empty {side} side of {}", self.symbol))
        })?;

        let level = levels
            .get_mut(&price)
            .ok_or_else(|| MarketError::Internal(format!("missing level in {}", self.symbol)))?;
        let order = level
            .front_mut()
            .ok_or_else(|| MarketError::Internal(format!("empty level left in {}", self.symbol)))?;

        if qty > order.remaining {
            return Err(MarketError::Internal(format!(
                "overfill of order {}: {} > {}",
                order.id, qty, order.remaining
            )));
        }

        order.fill(qty);
        let remaining = order.remaining;

        if order.is_filled() {
            level.pop_front();
            if level.is_empty() {
                levels.remove(&price);
            }
        }

        Ok(remaining)
    }

    /// All resting orders: bids best-first, then asks best-first.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.bids
            .values()
            .rev()
            .flatten()
            .chain(self.asks.values().flatten())
    }

    /// Resting orders owned by `account`.
    pub fn orders_for(&self, account: AccountId) -> Vec<Order> {
        self.orders().filter(|o| o.account == account).cloned().collect()
    }

    /// Number of resting (bid, ask) orders.
    pub fn depth(&self) -> (usize, usize) {
        (
            self.bids.values().map(VecDeque::len).sum(),
            self.asks.values().map(VecDeque::len).sum(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Snapshot of the current top-of-book.
    pub fn top_of_book(&self) -> TopOfBookSnapshot {
        TopOfBookSnapshot {
            bid: self
                .bids
                .iter()
                .next_back()
                .map(|(price, orders)| level_of(*price, orders)),
            ask: self
                .asks
                .iter()
                .next()
                .map(|(price, orders)| level_of(*price, orders)),
        }
    }

    /// Both sides of the current top-of-book as events.
    pub fn top_of_book_events(&self) -> Vec<Response> {
        let top = self.top_of_book();
        vec![
            side_event(&self.symbol, Side::Buy, top.bid),
            side_event(&self.symbol, Side::Sell, top.ask),
        ]
    }

    /// Emit an event for each side whose best level changed since the last
    /// call.
    pub fn check_top_of_book_changes(&mut self) -> Vec<Response> {
        let mut outputs = Vec::new();
        let current = self.top_of_book();

        if current.bid != self.prev_top.bid {
            outputs.push(side_event(&self.symbol, Side::Buy, current.bid));
        }
        if current.ask != self.prev_top.ask {
            outputs.push(side_event(&self.symbol, Side::Sell, current.ask));
        }

        self.prev_top = current;
        outputs
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn remove_from_side(levels: &mut Levels, order_id: OrderId) -> Option<Order> {
    let mut found = None;

    for (price, orders) in levels.iter_mut() {
        if let Some(idx) = orders.iter().position(|o| o.id == order_id) {
            found = orders.remove(idx).map(|order| (*price, order));
            break;
        }
    }

    let (price, order) = found?;
    if levels.get(&price).is_some_and(VecDeque::is_empty) {
        levels.remove(&price);
    }
    Some(order)
}

/// Sum of remaining quantity across all orders at one price level.
fn level_of(price: Price, orders: &VecDeque<Order>) -> Level {
    Level {
        price: price.value(),
        quantity: orders.iter().map(|o| o.remaining as u64).sum(),
    }
}

fn side_event(symbol: &str, side: Side, level: Option<Level>) -> Response {
    match level {
        Some(level) => Response::top_of_book(symbol, side, level.price, level.quantity),
        None => Response::top_of_book_eliminated(symbol, side),
    }
}
