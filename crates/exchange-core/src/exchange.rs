//! The exchange: one explicitly owned market instance.
//!
//! `Exchange` bundles the price feed, the account registry and one order
//! book per listed instrument, and exposes every trading and query entry
//! point. All methods take `&self`; the type is meant to be shared behind
//! an `Arc` between the price-feed ticker and any number of request
//! handlers.
//!
//! Lock discipline:
//! - instrument locks are only held long enough to copy a price;
//! - a book lock may be followed by account locks, never the reverse;
//! - two accounts are always locked lower id first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountId, Balances, Portfolio, TransactionRecord};
use crate::config::ExchangeConfig;
use crate::error::{ensure_positive_quantity, MarketError, MarketResult};
use crate::indicators::{self, Indicators};
use crate::instrument::{MarketAnalytics, Quote};
use crate::matching_engine::match_book;
use crate::messages::{Confirmation, Request, Response};
use crate::order::{Order, OrderId, Price};
use crate::order_book::OrderBook;
use crate::price_feed::PriceFeed;
use crate::registry::Accounts;
use crate::side::{Funding, Side};
use crate::top_of_book::TopOfBookSnapshot;

#[derive(Debug)]
pub struct Exchange {
    config: ExchangeConfig,
    feed: PriceFeed,
    accounts: Accounts,

    /// Symbol -> book. Fixed at construction, like the instrument list.
    books: IndexMap<String, Mutex<OrderBook>>,

    /// Tracks which book a resting order lives in, for cancel routing.
    order_to_symbol: DashMap<OrderId, String>,

    next_order_id: AtomicU64,
}

impl Exchange {
    pub fn new(config: ExchangeConfig) -> Self {
        let feed = PriceFeed::new(&config);
        let books = feed
            .symbols()
            .map(|symbol| (symbol.to_string(), Mutex::new(OrderBook::new(symbol))))
            .collect();
        let accounts = Accounts::new(config.margin_multiplier);

        info!(
            instruments = feed.symbols().count(),
            volatility = config.volatility,
            "exchange initialised"
        );

        Exchange {
            config,
            feed,
            accounts,
            books,
            order_to_symbol: DashMap::new(),
            next_order_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn price_feed(&self) -> &PriceFeed {
        &self.feed
    }

    pub fn accounts(&self) -> &Accounts {
        &self.accounts
    }

    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    /// Open an account; `cash` defaults to the configured starting cash.
    pub fn register_account(&self, username: &str, cash: Option<f64>) -> MarketResult<AccountId> {
        self.accounts
            .register(username, cash.unwrap_or(self.config.starting_cash))
    }

    /// Resolve a username to the opaque id every other entry point takes.
    pub fn authenticate(&self, username: &str) -> MarketResult<AccountId> {
        self.accounts.lookup(username)
    }

    pub fn balances(&self, account: AccountId) -> MarketResult<Balances> {
        self.accounts.with_account(account, |a| Ok(a.balances()))
    }

    /// Signed holding of `symbol` in `account` (0 when absent).
    pub fn holding(&self, account: AccountId, symbol: &str) -> MarketResult<i64> {
        self.accounts.with_account(account, |a| Ok(a.holding(symbol)))
    }

    pub fn add_funds(&self, account: AccountId, amount: f64) -> MarketResult<Confirmation> {
        self.accounts.with_account(account, |a| {
            let message = a.add_funds(amount)?;
            Ok(confirmation(a, message))
        })
    }

    // -------------------------------------------------------------------------
    // Market orders
    // -------------------------------------------------------------------------

    pub fn buy_market(&self, account: AccountId, symbol: &str, quantity: u32) -> MarketResult<Confirmation> {
        self.at_market(account, symbol, |a, price| a.buy_market(symbol, quantity, price))
    }

    pub fn sell_market(&self, account: AccountId, symbol: &str, quantity: u32) -> MarketResult<Confirmation> {
        self.at_market(account, symbol, |a, price| a.sell_market(symbol, quantity, price))
    }

    pub fn buy_on_margin(&self, account: AccountId, symbol: &str, quantity: u32) -> MarketResult<Confirmation> {
        self.at_market(account, symbol, |a, price| a.buy_on_margin(symbol, quantity, price))
    }

    pub fn short_sell(&self, account: AccountId, symbol: &str, quantity: u32) -> MarketResult<Confirmation> {
        self.at_market(account, symbol, |a, price| a.short_sell(symbol, quantity, price))
    }

    pub fn cover_short(&self, account: AccountId, symbol: &str, quantity: u32) -> MarketResult<Confirmation> {
        self.at_market(account, symbol, |a, price| a.cover_short(symbol, quantity, price))
    }

    /// Capture the reference price, then apply `op` under the account lock.
    fn at_market<F>(&self, account: AccountId, symbol: &str, op: F) -> MarketResult<Confirmation>
    where
        F: FnOnce(&mut Account, f64) -> MarketResult<String>,
    {
        let price = self.feed.current_price(symbol)?;
        self.accounts.with_account(account, |a| {
            let message = op(a, price)?;
            debug!(account = %a.id(), %message, "market order executed");
            Ok(confirmation(a, message))
        })
    }

    // -------------------------------------------------------------------------
    // Limit orders
    // -------------------------------------------------------------------------

    /// Escrow the order's worst-case value, rest it in the book and run
    /// matching.
    ///
    /// Returns the `OrderAccepted` event first, then any `Trade` events in
    /// execution order, then top-of-book changes.
    pub fn submit_limit_order(
        &self,
        account: AccountId,
        symbol: &str,
        side: Side,
        price: f64,
        quantity: u32,
        funding: Funding,
    ) -> MarketResult<Vec<Response>> {
        let cell = self.book(symbol)?;
        let price = Price::new(price)?;
        ensure_positive_quantity(quantity)?;

        // Proceeds of a sale always go to cash.
        let funding = match side {
            Side::Buy => funding,
            Side::Sell => Funding::Cash,
        };

        let mut book = cell.lock();

        // Bid escrow is keyed by order id. A rejected order leaves a gap in
        // the sequence; ids stay unique and increasing.
        let order_id = OrderId(self.next_order_id.fetch_add(1, Ordering::Relaxed));

        let balances = self.accounts.with_account(account, |a| {
            match side {
                Side::Buy => a.reserve_for_bid(order_id, symbol, quantity, price.value(), funding)?,
                Side::Sell => a.reserve_for_ask(symbol, quantity)?,
            }
            Ok(a.balances())
        })?;

        let order = Order::new(order_id, account, symbol, side, price, quantity, funding);
        self.order_to_symbol.insert(order_id, symbol.to_string());
        book.insert(order);

        let message = format!(
            "Limit order #{order_id} placed to {side} {quantity} shares of {symbol} at ${:.2}",
            price.value()
        );
        info!(account = %account, %order_id, symbol, %side, price = price.value(), quantity, "limit order accepted");

        let mut outputs = vec![Response::OrderAccepted {
            message,
            order_id,
            symbol: symbol.to_string(),
            side,
            price: price.value(),
            quantity,
            funding,
            balances,
        }];

        let trades = match_book(&mut book, &self.accounts)?;
        for trade in &trades {
            if let Response::Trade(t) = trade {
                self.forget_if_done(&book, t.buy_order);
                self.forget_if_done(&book, t.sell_order);
            }
        }
        outputs.extend(trades);
        outputs.extend(book.check_top_of_book_changes());

        Ok(outputs)
    }

    /// Cancel a resting order owned by `account` and release its escrow.
    ///
    /// Fails with `NotFound` if the order is unknown, already filled, or
    /// belongs to someone else.
    pub fn cancel_order(&self, account: AccountId, order_id: OrderId) -> MarketResult<Vec<Response>> {
        let symbol = self
            .order_to_symbol
            .get(&order_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| MarketError::unknown_order(order_id.0))?;

        let cell = self.book(&symbol)?;
        let mut book = cell.lock();

        match book.get(order_id) {
            Some(order) if order.account == account => {}
            _ => return Err(MarketError::unknown_order(order_id.0)),
        }

        let order = book
            .cancel(order_id)
            .ok_or_else(|| MarketError::unknown_order(order_id.0))?;
        self.order_to_symbol.remove(&order_id);

        self.accounts.with_account(account, |a| match order.side {
            Side::Buy => a.release_bid(order.id),
            Side::Sell => {
                a.release_ask(&order.symbol, order.remaining);
                Ok(())
            }
        })?;

        info!(account = %account, %order_id, symbol = %symbol, remaining = order.remaining, "order cancelled");

        let mut outputs = vec![Response::CancelAck {
            order_id,
            symbol,
            remaining: order.remaining,
        }];
        outputs.extend(book.check_top_of_book_changes());
        Ok(outputs)
    }

    /// Resting orders owned by `account`, across all books.
    pub fn open_orders(&self, account: AccountId) -> Vec<Order> {
        self.books
            .values()
            .flat_map(|cell| cell.lock().orders_for(account))
            .collect()
    }

    pub fn best_bid(&self, symbol: &str) -> MarketResult<Option<Order>> {
        Ok(self.book(symbol)?.lock().best_bid().cloned())
    }

    pub fn best_ask(&self, symbol: &str) -> MarketResult<Option<Order>> {
        Ok(self.book(symbol)?.lock().best_ask().cloned())
    }

    pub fn top_of_book(&self, symbol: &str) -> MarketResult<TopOfBookSnapshot> {
        Ok(self.book(symbol)?.lock().top_of_book())
    }

    // -------------------------------------------------------------------------
    // Market data
    // -------------------------------------------------------------------------

    /// Advance the price feed by one step.
    pub fn tick<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Quote> {
        self.feed.tick(rng)
    }

    pub fn current_price(&self, symbol: &str) -> MarketResult<f64> {
        self.feed.current_price(symbol)
    }

    pub fn quote(&self, symbol: &str) -> MarketResult<Quote> {
        self.feed.quote(symbol)
    }

    pub fn quotes(&self) -> Vec<Quote> {
        self.feed.quotes()
    }

    pub fn analytics(&self) -> Option<MarketAnalytics> {
        self.feed.analytics()
    }

    pub fn indicators(&self, symbol: &str, period: usize) -> MarketResult<Indicators> {
        let history = self.feed.history(symbol)?;
        Ok(Indicators {
            symbol: symbol.to_string(),
            period,
            sma: indicators::sma(&history, period),
            ema: indicators::ema(&history, period),
        })
    }

    // -------------------------------------------------------------------------
    // Account queries
    // -------------------------------------------------------------------------

    /// Holdings valued at current prices.
    pub fn portfolio(&self, account: AccountId) -> MarketResult<Portfolio> {
        let prices: HashMap<String, f64> = self
            .feed
            .quotes()
            .into_iter()
            .map(|q| (q.symbol, q.price))
            .collect();
        self.accounts
            .with_account(account, |a| Ok(a.portfolio(|symbol| prices.get(symbol).copied())))
    }

    pub fn portfolio_value(&self, account: AccountId) -> MarketResult<f64> {
        Ok(self.portfolio(account)?.total_value)
    }

    pub fn transaction_history(&self, account: AccountId) -> MarketResult<Vec<TransactionRecord>> {
        self.accounts.with_account(account, |a| Ok(a.history().to_vec()))
    }

    // -------------------------------------------------------------------------
    // Message processing
    // -------------------------------------------------------------------------

    /// Process a single request and return the resulting events.
    ///
    /// Failures come back as a single `Rejected` event; nothing has been
    /// changed in that case.
    pub fn process(&self, request: Request) -> Vec<Response> {
        match self.dispatch(request) {
            Ok(outputs) => outputs,
            Err(error) => {
                warn!(%error, "request rejected");
                vec![Response::rejected(error)]
            }
        }
    }

    fn dispatch(&self, request: Request) -> MarketResult<Vec<Response>> {
        let single = |confirmation: Confirmation| vec![Response::Confirmed(confirmation)];

        match request {
            Request::Register { username, cash } => {
                let account = self.register_account(&username, cash)?;
                Ok(vec![Response::Registered {
                    account,
                    username: username.trim().to_string(),
                    balances: self.balances(account)?,
                }])
            }
            Request::AddFunds { username, amount } => {
                let account = self.authenticate(&username)?;
                self.add_funds(account, amount).map(single)
            }
            Request::BuyMarket { username, symbol, quantity } => {
                let account = self.authenticate(&username)?;
                self.buy_market(account, &symbol, quantity).map(single)
            }
            Request::SellMarket { username, symbol, quantity } => {
                let account = self.authenticate(&username)?;
                self.sell_market(account, &symbol, quantity).map(single)
            }
            Request::BuyOnMargin { username, symbol, quantity } => {
                let account = self.authenticate(&username)?;
                self.buy_on_margin(account, &symbol, quantity).map(single)
            }
            Request::ShortSell { username, symbol, quantity } => {
                let account = self.authenticate(&username)?;
                self.short_sell(account, &symbol, quantity).map(single)
            }
            Request::CoverShort { username, symbol, quantity } => {
                let account = self.authenticate(&username)?;
                self.cover_short(account, &symbol, quantity).map(single)
            }
            Request::SubmitLimit {
                username,
                symbol,
                side,
                price,
                quantity,
                funding,
            } => {
                let account = self.authenticate(&username)?;
                self.submit_limit_order(account, &symbol, side, price, quantity, funding)
            }
            Request::Cancel { username, order_id } => {
                let account = self.authenticate(&username)?;
                self.cancel_order(account, order_id)
            }
            Request::Quote { symbol } => Ok(vec![Response::Quote(self.quote(&symbol)?)]),
            Request::ListMarket => Ok(vec![Response::Quotes { quotes: self.quotes() }]),
            Request::Portfolio { username } => {
                let account = self.authenticate(&username)?;
                Ok(vec![Response::Portfolio(self.portfolio(account)?)])
            }
            Request::History { username } => {
                let account = self.authenticate(&username)?;
                Ok(vec![Response::History {
                    records: self.transaction_history(account)?,
                    username,
                }])
            }
            Request::TopOfBook { symbol } => Ok(self.book(&symbol)?.lock().top_of_book_events()),
            Request::Analytics => Ok(self
                .analytics()
                .map(Response::Analytics)
                .into_iter()
                .collect()),
            Request::Indicators { symbol, period } => {
                Ok(vec![Response::Indicators(self.indicators(&symbol, period)?)])
            }
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn book(&self, symbol: &str) -> MarketResult<&Mutex<OrderBook>> {
        self.books
            .get(symbol)
            .ok_or_else(|| MarketError::unknown_symbol(symbol))
    }

    fn forget_if_done(&self, book: &OrderBook, order_id: OrderId) {
        if book.get(order_id).is_none() {
            self.order_to_symbol.remove(&order_id);
        }
    }
}

fn confirmation(account: &Account, message: String) -> Confirmation {
    Confirmation {
        message,
        balances: account.balances(),
    }
}
