//! Crossing loop for a single book.
//!
//! Run after every book mutation. While the best bid is priced at or above
//! the best ask, the two front orders trade at the ask's price for the
//! smaller of their remaining quantities, both owners are settled under
//! their account locks, and the fills are applied to the book.
//!
//! Settlement cannot fail halfway: both orders escrowed their worst-case
//! value when they were submitted, so a fill only consumes reservations.
//! The caller holds the book lock for the whole loop, which keeps the
//! book → account lock order used everywhere else.

use tracing::info;

use crate::account::Account;
use crate::error::{MarketError, MarketResult};
use crate::messages::{Response, Trade};
use crate::order::Order;
use crate::order_book::OrderBook;
use crate::registry::{Accounts, Pair};
use crate::side::Side;

/// Match `book` until no cross remains, returning one `Trade` event per
/// fill, in execution order.
pub fn match_book(book: &mut OrderBook, accounts: &Accounts) -> MarketResult<Vec<Response>> {
    let mut trades = Vec::new();

    loop {
        let (bid, ask) = match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => (bid.clone(), ask.clone()),
            _ => break,
        };

        if bid.is_filled() || ask.is_filled() {
            debug_assert!(false, "filled order left resting in {}", book.symbol());
            return Err(MarketError::Internal(format!(
                "filled order left resting in {}",
                book.symbol()
            )));
        }

        if bid.price < ask.price {
            break;
        }

        let price = ask.price.value();
        let quantity = bid.remaining.min(ask.remaining);

        accounts.with_pair(bid.account, ask.account, |pair| match pair {
            Pair::Distinct(buyer, seller) => settle(buyer, &bid, seller, &ask, price, quantity),
            Pair::Same(account) => settle_self(account, &bid, &ask, price, quantity),
        })??;

        book.fill_best(Side::Buy, quantity)?;
        book.fill_best(Side::Sell, quantity)?;

        info!(
            symbol = book.symbol(),
            buy_order = %bid.id,
            sell_order = %ask.id,
            price,
            quantity,
            "trade"
        );

        trades.push(Response::Trade(Trade {
            symbol: book.symbol().to_string(),
            buy_order: bid.id,
            buyer: bid.account,
            sell_order: ask.id,
            seller: ask.account,
            price,
            quantity,
        }));
    }

    debug_assert!(!book.top_of_book().is_crossed());
    Ok(trades)
}

/// The buy side goes first: it is the only half that can fail, and it
/// fails before changing anything.
fn settle(
    buyer: &mut Account,
    bid: &Order,
    seller: &mut Account,
    ask: &Order,
    price: f64,
    quantity: u32,
) -> MarketResult<()> {
    buyer.settle_buy(bid.id, &bid.symbol, quantity, price)?;
    seller.settle_sell(&ask.symbol, quantity, price);
    Ok(())
}

/// Both sides belong to one account: it pays itself and gets its own
/// escrowed shares back.
fn settle_self(account: &mut Account, bid: &Order, ask: &Order, price: f64, quantity: u32) -> MarketResult<()> {
    account.settle_buy(bid.id, &bid.symbol, quantity, price)?;
    account.settle_sell(&ask.symbol, quantity, price);
    Ok(())
}
