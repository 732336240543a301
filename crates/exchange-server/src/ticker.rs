//! Price-feed ticker.
//!
//! Advances every instrument's random walk once per interval. Ticks are
//! not broadcast; clients ask for quotes when they need them.

use std::sync::Arc;
use std::time::Duration;

use exchange_core::Exchange;
use rand::rngs::StdRng;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

/// Run forever, ticking `exchange` every `period`.
///
/// The first tick fires one full `period` after start, so the seeded
/// prices are observable right after startup.
pub async fn run_ticker(exchange: Arc<Exchange>, period: Duration, mut rng: StdRng) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // `interval` completes its first tick immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let quotes = exchange.tick(&mut rng);
        for quote in &quotes {
            debug!(symbol = %quote.symbol, price = quote.price, "tick");
        }
    }
}
