//! exchange-core
//!
//! Pure market engine logic:
//! - price feed (random-walk simulation over listed instruments)
//! - per-user ledger (cash, margin, debt, holdings, escrow)
//! - per-symbol limit order book
//! - crossing loop and trade settlement
//! - the `Exchange` context tying them together
//! - messages (request / response types)

pub mod side;
pub mod error;
pub mod config;
pub mod instrument;
pub mod price_feed;
pub mod indicators;
pub mod account;
pub mod registry;
pub mod order;
pub mod order_book;
pub mod top_of_book;
pub mod matching_engine;
pub mod messages;
pub mod exchange;

pub use side::{Funding, Side};
pub use error::{EntityKind, MarketError, MarketResult};
pub use config::{ExchangeConfig, InstrumentSeed};

pub use messages::{Confirmation, Request, Response, TopOfBook, Trade};

pub use account::{Account, AccountId, Balances, Portfolio, Position, TransactionRecord};
pub use instrument::{Instrument, MarketAnalytics, Quote};
pub use indicators::Indicators;
pub use order::{Order, OrderId, Price};
pub use order_book::OrderBook;
pub use price_feed::PriceFeed;
pub use registry::Accounts;
pub use top_of_book::{Level, TopOfBookSnapshot};
pub use exchange::Exchange;
