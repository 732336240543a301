//! Per-user ledger: cash, margin pool, debt, share holdings and escrow.
//!
//! All mutations take an already-captured reference price, validate
//! first and only then touch state, so an `Err` never leaves a partially
//! applied change behind. Locking lives one level up, in
//! [`Accounts`](crate::registry::Accounts).
//!
//! Holdings are signed: a negative quantity is an open short position.
//! A symbol is never stored with a zero quantity; every holding change
//! goes through [`adjust_position`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_positive_amount, ensure_positive_quantity, MarketError, MarketResult};
use crate::order::OrderId;
use crate::side::Funding;

/// Opaque account identifier. Also defines the lock order between accounts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of an account's transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub at: DateTime<Utc>,
    pub description: String,
}

/// Monetary state of an account, returned with every confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balances {
    pub cash: f64,
    pub margin_balance: f64,
    pub debt: f64,
    /// Cash held by resting cash-funded buy orders.
    pub reserved_cash: f64,
    /// Margin held by resting margin-funded buy orders.
    pub reserved_margin: f64,
}

/// Valued position in one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Signed quantity; negative for a short.
    pub quantity: i64,
    /// Shares escrowed by resting sell orders.
    pub reserved: i64,
    pub price: f64,
    pub value: f64,
}

/// Valued view of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub account: AccountId,
    pub username: String,
    pub balances: Balances,
    pub positions: Vec<Position>,
    /// Sum of position values (shorts count negative).
    pub total_value: f64,
}

/// Funds held for one resting bid.
///
/// Each fill releases `quantity × limit`; the last fill releases whatever
/// is left, so the escrow always returns exactly what was taken.
#[derive(Debug, Clone, Copy)]
struct BidEscrow {
    funding: Funding,
    limit: f64,
    remaining: u32,
    amount: f64,
}

#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    username: String,

    cash: f64,
    margin_balance: f64,
    debt: f64,

    holdings: BTreeMap<String, i64>,
    /// Entry value of open short positions, per symbol.
    short_liability: BTreeMap<String, f64>,

    bid_escrow: BTreeMap<OrderId, BidEscrow>,
    reserved_shares: BTreeMap<String, i64>,

    history: Vec<TransactionRecord>,
}

impl Account {
    /// Open an account. The margin pool starts at `margin_multiplier × cash`.
    pub fn new(id: AccountId, username: impl Into<String>, cash: f64, margin_multiplier: f64) -> Self {
        Account {
            id,
            username: username.into(),
            cash,
            margin_balance: cash * margin_multiplier,
            debt: 0.0,
            holdings: BTreeMap::new(),
            short_liability: BTreeMap::new(),
            bid_escrow: BTreeMap::new(),
            reserved_shares: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn margin_balance(&self) -> f64 {
        self.margin_balance
    }

    pub fn debt(&self) -> f64 {
        self.debt
    }

    /// Signed quantity held in `symbol` (0 when absent).
    pub fn holding(&self, symbol: &str) -> i64 {
        self.holdings.get(symbol).copied().unwrap_or(0)
    }

    pub fn holdings(&self) -> &BTreeMap<String, i64> {
        &self.holdings
    }

    pub fn reserved_shares(&self, symbol: &str) -> i64 {
        self.reserved_shares.get(symbol).copied().unwrap_or(0)
    }

    pub fn short_liability(&self, symbol: &str) -> f64 {
        self.short_liability.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn history(&self) -> &[TransactionRecord] {
        &self.history
    }

    pub fn balances(&self) -> Balances {
        Balances {
            cash: self.cash,
            margin_balance: self.margin_balance,
            debt: self.debt,
            reserved_cash: self.reserved(Funding::Cash),
            reserved_margin: self.reserved(Funding::Margin),
        }
    }

    /// Total held by resting bids funded from `funding`.
    fn reserved(&self, funding: Funding) -> f64 {
        self.bid_escrow
            .values()
            .filter(|e| e.funding == funding)
            .map(|e| e.amount)
            .sum()
    }

    // -------------------------------------------------------------------------
    // Cash
    // -------------------------------------------------------------------------

    pub fn credit(&mut self, amount: f64) -> MarketResult<()> {
        ensure_positive_amount("amount", amount)?;
        self.cash += amount;
        Ok(())
    }

    pub fn debit(&mut self, amount: f64) -> MarketResult<()> {
        ensure_positive_amount("amount", amount)?;
        self.ensure_cash(amount)?;
        self.cash -= amount;
        Ok(())
    }

    pub fn add_funds(&mut self, amount: f64) -> MarketResult<String> {
        self.credit(amount)?;
        Ok(self.record(format!(
            "Added ${amount:.2} to account, new balance ${:.2}",
            self.cash
        )))
    }

    // -------------------------------------------------------------------------
    // Market orders
    // -------------------------------------------------------------------------

    pub fn buy_market(&mut self, symbol: &str, quantity: u32, price: f64) -> MarketResult<String> {
        let total = notional(quantity, price)?;
        self.ensure_not_short(symbol)?;
        self.ensure_cash(total)?;

        self.cash -= total;
        adjust_position(&mut self.holdings, symbol, quantity as i64);
        Ok(self.record(format!(
            "Bought {quantity} shares of {symbol} at ${price:.2} for ${total:.2}"
        )))
    }

    pub fn sell_market(&mut self, symbol: &str, quantity: u32, price: f64) -> MarketResult<String> {
        let total = notional(quantity, price)?;
        self.ensure_shares(symbol, quantity)?;

        self.cash += total;
        adjust_position(&mut self.holdings, symbol, -(quantity as i64));
        Ok(self.record(format!(
            "Sold {quantity} shares of {symbol} at ${price:.2} for ${total:.2}"
        )))
    }

    /// Buy from the margin pool. Cash is untouched; the cost becomes debt.
    pub fn buy_on_margin(&mut self, symbol: &str, quantity: u32, price: f64) -> MarketResult<String> {
        let total = notional(quantity, price)?;
        self.ensure_not_short(symbol)?;
        self.ensure_margin(total)?;

        self.margin_balance -= total;
        self.debt += total;
        adjust_position(&mut self.holdings, symbol, quantity as i64);
        Ok(self.record(format!(
            "Bought {quantity} shares of {symbol} on margin at ${price:.2} for ${total:.2}"
        )))
    }

    /// Sell borrowed shares.
    ///
    /// The sale is collateralised by the margin pool: the notional moves
    /// from margin to cash, is booked as debt, and the shares are recorded
    /// as a negative holding. Not allowed while any shares of `symbol` are
    /// held, including shares escrowed by a resting ask.
    pub fn short_sell(&mut self, symbol: &str, quantity: u32, price: f64) -> MarketResult<String> {
        let total = notional(quantity, price)?;
        if self.holding(symbol) > 0 || self.reserved_shares(symbol) > 0 {
            return Err(MarketError::PositionConflict {
                symbol: symbol.to_string(),
            });
        }
        self.ensure_margin(total)?;

        self.margin_balance -= total;
        self.cash += total;
        self.debt += total;
        *self.short_liability.entry(symbol.to_string()).or_insert(0.0) += total;
        adjust_position(&mut self.holdings, symbol, -(quantity as i64));
        Ok(self.record(format!(
            "Short sold {quantity} shares of {symbol} at ${price:.2} for ${total:.2}"
        )))
    }

    /// Buy back shorted shares.
    ///
    /// Pays the current price from cash and releases the covered fraction of
    /// the short's entry value from debt back into the margin pool.
    pub fn cover_short(&mut self, symbol: &str, quantity: u32, price: f64) -> MarketResult<String> {
        let cost = notional(quantity, price)?;
        let open = (-self.holding(symbol)).max(0);
        if open < quantity as i64 {
            return Err(MarketError::InsufficientShares {
                symbol: symbol.to_string(),
                required: quantity as i64,
                available: open,
            });
        }
        self.ensure_cash(cost)?;

        self.cash -= cost;
        self.receive_shares(symbol, quantity as i64);
        Ok(self.record(format!(
            "Covered {quantity} shares of {symbol} at ${price:.2} for ${cost:.2}"
        )))
    }

    // -------------------------------------------------------------------------
    // Limit-order escrow
    // -------------------------------------------------------------------------

    /// Escrow the worst-case cost (`limit × quantity`) of resting bid
    /// `order_id`.
    pub fn reserve_for_bid(
        &mut self,
        order_id: OrderId,
        symbol: &str,
        quantity: u32,
        limit: f64,
        funding: Funding,
    ) -> MarketResult<()> {
        let total = notional(quantity, limit)?;
        self.ensure_not_short(symbol)?;
        if self.bid_escrow.contains_key(&order_id) {
            return Err(MarketError::Internal(format!("order {order_id} already escrowed")));
        }

        match funding {
            Funding::Cash => {
                self.ensure_cash(total)?;
                self.cash -= total;
            }
            Funding::Margin => {
                self.ensure_margin(total)?;
                self.margin_balance -= total;
            }
        }
        self.bid_escrow.insert(
            order_id,
            BidEscrow {
                funding,
                limit,
                remaining: quantity,
                amount: total,
            },
        );
        Ok(())
    }

    /// Move `quantity` shares out of holdings into escrow for a resting ask.
    pub fn reserve_for_ask(&mut self, symbol: &str, quantity: u32) -> MarketResult<()> {
        ensure_positive_quantity(quantity)?;
        self.ensure_shares(symbol, quantity)?;

        adjust_position(&mut self.holdings, symbol, -(quantity as i64));
        adjust_position(&mut self.reserved_shares, symbol, quantity as i64);
        Ok(())
    }

    /// Return everything still escrowed for bid `order_id`.
    pub fn release_bid(&mut self, order_id: OrderId) -> MarketResult<()> {
        let escrow = self
            .bid_escrow
            .remove(&order_id)
            .ok_or_else(|| MarketError::unknown_order(order_id.0))?;
        match escrow.funding {
            Funding::Cash => self.cash += escrow.amount,
            Funding::Margin => self.margin_balance += escrow.amount,
        }
        Ok(())
    }

    /// Return the unfilled part of an ask's escrowed shares to holdings.
    pub fn release_ask(&mut self, symbol: &str, remaining: u32) {
        adjust_position(&mut self.reserved_shares, symbol, -(remaining as i64));
        self.receive_shares(symbol, remaining as i64);
    }

    /// Settle the buy side of a fill out of bid `order_id`'s escrow.
    ///
    /// The escrow was taken at the limit price; any improvement between the
    /// limit and the execution price is refunded to the funding pool.
    /// Fails without touching anything if the bid has no escrow left for
    /// `quantity` shares.
    pub fn settle_buy(
        &mut self,
        order_id: OrderId,
        symbol: &str,
        quantity: u32,
        price: f64,
    ) -> MarketResult<String> {
        let escrow = self
            .bid_escrow
            .get_mut(&order_id)
            .ok_or_else(|| MarketError::unknown_order(order_id.0))?;
        if quantity > escrow.remaining {
            return Err(MarketError::Internal(format!(
                "overfill of order {order_id}: {quantity} > {}",
                escrow.remaining
            )));
        }

        let funding = escrow.funding;
        let limit = escrow.limit;
        let released = if quantity == escrow.remaining {
            escrow.amount
        } else {
            (quantity as f64 * limit).min(escrow.amount)
        };
        escrow.remaining -= quantity;
        escrow.amount -= released;
        if escrow.remaining == 0 {
            self.bid_escrow.remove(&order_id);
        }

        let cost = quantity as f64 * price;
        let refund = (released - cost).max(0.0);
        match funding {
            Funding::Cash => self.cash += refund,
            Funding::Margin => {
                self.margin_balance += refund;
                self.debt += cost;
            }
        }
        self.receive_shares(symbol, quantity as i64);

        let via = match funding {
            Funding::Cash => "",
            Funding::Margin => " on margin",
        };
        Ok(self.record(format!(
            "Bought {quantity} shares of {symbol}{via} at ${price:.2} for ${cost:.2} (limit ${limit:.2})"
        )))
    }

    /// Settle the sell side of a fill out of the ask's escrowed shares.
    pub fn settle_sell(&mut self, symbol: &str, quantity: u32, price: f64) -> String {
        let proceeds = quantity as f64 * price;
        adjust_position(&mut self.reserved_shares, symbol, -(quantity as i64));
        self.cash += proceeds;
        self.record(format!(
            "Sold {quantity} shares of {symbol} at ${price:.2} for ${proceeds:.2} (limit order)"
        ))
    }

    // -------------------------------------------------------------------------
    // Valuation
    // -------------------------------------------------------------------------

    /// Value holdings (and escrowed shares) with `price_of`.
    ///
    /// Symbols for which `price_of` has no price are valued at zero.
    pub fn portfolio<F>(&self, price_of: F) -> Portfolio
    where
        F: Fn(&str) -> Option<f64>,
    {
        let mut symbols: Vec<&String> = self.holdings.keys().collect();
        for symbol in self.reserved_shares.keys() {
            if !self.holdings.contains_key(symbol) {
                symbols.push(symbol);
            }
        }
        symbols.sort();

        let positions: Vec<Position> = symbols
            .into_iter()
            .map(|symbol| {
                let quantity = self.holding(symbol);
                let reserved = self.reserved_shares(symbol);
                let price = price_of(symbol).unwrap_or(0.0);
                Position {
                    symbol: symbol.clone(),
                    quantity,
                    reserved,
                    price,
                    value: (quantity + reserved) as f64 * price,
                }
            })
            .collect();

        let total_value = positions.iter().map(|p| p.value).sum();

        Portfolio {
            account: self.id,
            username: self.username.clone(),
            balances: self.balances(),
            positions,
            total_value,
        }
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    /// Add shares, covering any open short first.
    fn receive_shares(&mut self, symbol: &str, quantity: i64) {
        let open = (-self.holding(symbol)).max(0);
        let covered = open.min(quantity);
        if covered > 0 {
            let liability = self.short_liability(symbol);
            let released = liability * covered as f64 / open as f64;
            self.debt = (self.debt - released).max(0.0);
            self.margin_balance += released;
            if covered == open {
                self.short_liability.remove(symbol);
            } else {
                self.short_liability.insert(symbol.to_string(), liability - released);
            }
        }
        adjust_position(&mut self.holdings, symbol, quantity);
    }

    fn record(&mut self, description: String) -> String {
        self.history.push(TransactionRecord {
            at: Utc::now(),
            description: description.clone(),
        });
        description
    }

    fn ensure_cash(&self, required: f64) -> MarketResult<()> {
        if self.cash < required {
            return Err(MarketError::InsufficientFunds {
                required,
                available: self.cash,
            });
        }
        Ok(())
    }

    fn ensure_margin(&self, required: f64) -> MarketResult<()> {
        if self.margin_balance < required {
            return Err(MarketError::InsufficientMargin {
                required,
                available: self.margin_balance,
            });
        }
        Ok(())
    }

    fn ensure_shares(&self, symbol: &str, quantity: u32) -> MarketResult<()> {
        let available = self.holding(symbol);
        if available < quantity as i64 {
            return Err(MarketError::InsufficientShares {
                symbol: symbol.to_string(),
                required: quantity as i64,
                available: available.max(0),
            });
        }
        Ok(())
    }

    fn ensure_not_short(&self, symbol: &str) -> MarketResult<()> {
        if self.holding(symbol) < 0 {
            return Err(MarketError::PositionConflict {
                symbol: symbol.to_string(),
            });
        }
        Ok(())
    }
}

/// `price × quantity`, validating both.
fn notional(quantity: u32, price: f64) -> MarketResult<f64> {
    ensure_positive_quantity(quantity)?;
    ensure_positive_amount("price", price)?;
    Ok(quantity as f64 * price)
}

/// Apply a signed delta, dropping the key when the result is zero.
fn adjust_position(positions: &mut BTreeMap<String, i64>, symbol: &str, delta: i64) {
    let next = positions.get(symbol).copied().unwrap_or(0) + delta;
    if next == 0 {
        positions.remove(symbol);
    } else {
        positions.insert(symbol.to_string(), next);
    }
}
