// crates/exchange-core/tests/market_scenarios.rs
use exchange_core::{
    AccountId, Exchange, ExchangeConfig, Funding, InstrumentSeed, MarketError, Response, Side,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn exchange() -> Exchange {
    Exchange::new(ExchangeConfig::default())
}

fn trades(outputs: &[Response]) -> Vec<&exchange_core::Trade> {
    outputs
        .iter()
        .filter_map(|o| match o {
            Response::Trade(t) => Some(t),
            _ => None,
        })
        .collect()
}

fn assert_no_zero_holdings(ex: &Exchange, account: AccountId) {
    let portfolio = ex.portfolio(account).unwrap();
    for position in &portfolio.positions {
        assert!(
            position.quantity != 0 || position.reserved != 0,
            "zero position stored for {}",
            position.symbol
        );
    }
}

#[test]
fn prices_stay_positive_after_many_ticks() {
    let config = ExchangeConfig {
        instruments: vec![InstrumentSeed::new("PENNY", 1.0), InstrumentSeed::new("AAPL", 150.0)],
        ..ExchangeConfig::default()
    };
    let ex = Exchange::new(config);
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..10_000 {
        for quote in ex.tick(&mut rng) {
            assert!(quote.price > 0.0);
            assert!(quote.price >= 0.01);
        }
    }

    let history = ex.price_feed().history("PENNY").unwrap();
    assert_eq!(history.len(), 10_001);
    assert!(history.iter().all(|p| *p >= 0.01));
    assert_eq!(*history.last().unwrap(), ex.current_price("PENNY").unwrap());
}

#[test]
fn tick_moves_each_price_by_at_most_volatility() {
    let ex = exchange();
    let before = ex.quotes();
    let mut rng = StdRng::seed_from_u64(42);
    let after = ex.tick(&mut rng);

    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.symbol, a.symbol);
        assert!((a.price - b.price).abs() <= 5.0 + 1e-9);
    }
}

#[test]
fn unknown_symbol_is_not_found() {
    let ex = exchange();
    assert!(matches!(ex.current_price("NOPE"), Err(MarketError::NotFound { .. })));

    let a = ex.register_account("alice", None).unwrap();
    assert!(matches!(ex.buy_market(a, "NOPE", 1), Err(MarketError::NotFound { .. })));
    assert!(matches!(
        ex.submit_limit_order(a, "NOPE", Side::Buy, 1.0, 1, Funding::Cash),
        Err(MarketError::NotFound { .. })
    ));
}

#[test]
fn aapl_buy_then_sell_round_trip() {
    let ex = exchange();
    let a = ex.register_account("A", Some(10_000.0)).unwrap();

    let confirmation = ex.buy_market(a, "AAPL", 10).unwrap();
    assert_eq!(confirmation.balances.cash, 8_500.0);
    assert_eq!(ex.holding(a, "AAPL").unwrap(), 10);
    assert_eq!(ex.transaction_history(a).unwrap().len(), 1);
    assert!(confirmation.message.contains("Bought 10 shares of AAPL"));

    let confirmation = ex.sell_market(a, "AAPL", 10).unwrap();
    assert_eq!(confirmation.balances.cash, 10_000.0);
    assert!(!ex.portfolio(a).unwrap().positions.iter().any(|p| p.symbol == "AAPL"));
    assert_eq!(ex.transaction_history(a).unwrap().len(), 2);
}

#[test]
fn insufficient_funds_leaves_account_untouched() {
    let ex = exchange();
    let d = ex.register_account("D", Some(100.0)).unwrap();

    let err = ex.buy_market(d, "GOOG", 1).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientFunds { .. }));
    assert_eq!(ex.balances(d).unwrap().cash, 100.0);
    assert!(ex.portfolio(d).unwrap().positions.is_empty());
    assert!(ex.transaction_history(d).unwrap().is_empty());
}

#[test]
fn selling_more_than_held_is_rejected() {
    let ex = exchange();
    let a = ex.register_account("A", None).unwrap();
    ex.buy_market(a, "MSFT", 2).unwrap();

    let err = ex.sell_market(a, "MSFT", 3).unwrap_err();
    assert!(matches!(err, MarketError::InsufficientShares { required: 3, available: 2, .. }));
    assert_eq!(ex.holding(a, "MSFT").unwrap(), 2);
}

#[test]
fn tsla_limit_orders_cross_at_ask_price() {
    let ex = exchange();
    let b = ex.register_account("B", None).unwrap();
    let c = ex.register_account("C", None).unwrap();

    ex.buy_market(b, "TSLA", 5).unwrap();
    let b_cash = ex.balances(b).unwrap().cash;

    let outputs = ex
        .submit_limit_order(b, "TSLA", Side::Sell, 800.0, 5, Funding::Cash)
        .unwrap();
    assert!(trades(&outputs).is_empty());
    assert!(matches!(outputs[0], Response::OrderAccepted { .. }));

    let outputs = ex
        .submit_limit_order(c, "TSLA", Side::Buy, 805.0, 5, Funding::Cash)
        .unwrap();
    let fills = trades(&outputs);
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].price, 800.0);
    assert_eq!(fills[0].quantity, 5);
    assert_eq!(fills[0].buyer, c);
    assert_eq!(fills[0].seller, b);

    assert_eq!(ex.balances(b).unwrap().cash, b_cash + 4_000.0);
    assert_eq!(ex.holding(c, "TSLA").unwrap(), 5);
    assert_eq!(ex.holding(b, "TSLA").unwrap(), 0);

    // Buyer paid the ask, not the limit.
    let c_balances = ex.balances(c).unwrap();
    assert_eq!(c_balances.cash, 6_000.0);
    assert_eq!(c_balances.reserved_cash, 0.0);

    assert!(ex.best_bid("TSLA").unwrap().is_none());
    assert!(ex.best_ask("TSLA").unwrap().is_none());
    assert!(ex.open_orders(b).is_empty());
    assert!(ex.open_orders(c).is_empty());
}

#[test]
fn equal_price_asks_fill_in_arrival_order() {
    let ex = exchange();
    let s1 = ex.register_account("s1", None).unwrap();
    let s2 = ex.register_account("s2", None).unwrap();
    let buyer = ex.register_account("buyer", None).unwrap();
    ex.buy_market(s1, "AAPL", 5).unwrap();
    ex.buy_market(s2, "AAPL", 5).unwrap();

    ex.submit_limit_order(s1, "AAPL", Side::Sell, 151.0, 5, Funding::Cash)
        .unwrap();
    ex.submit_limit_order(s2, "AAPL", Side::Sell, 151.0, 5, Funding::Cash)
        .unwrap();

    let outputs = ex
        .submit_limit_order(buyer, "AAPL", Side::Buy, 152.0, 7, Funding::Cash)
        .unwrap();
    let fills = trades(&outputs);
    assert_eq!(fills.len(), 2);
    assert_eq!((fills[0].seller, fills[0].quantity), (s1, 5));
    assert_eq!((fills[1].seller, fills[1].quantity), (s2, 2));
    assert!(fills[0].sell_order < fills[1].sell_order);

    let rest = ex.best_ask("AAPL").unwrap().unwrap();
    assert_eq!(rest.account, s2);
    assert_eq!(rest.remaining, 3);
    assert!(ex.best_bid("AAPL").unwrap().is_none());

    assert_eq!(ex.balances(buyer).unwrap().cash, 10_000.0 - 7.0 * 151.0);
    assert_eq!(ex.holding(buyer, "AAPL").unwrap(), 7);
}

#[test]
fn full_fill_removes_both_orders() {
    let ex = exchange();
    let seller = ex.register_account("seller", None).unwrap();
    let buyer = ex.register_account("buyer", None).unwrap();
    ex.buy_market(seller, "MSFT", 4).unwrap();

    ex.submit_limit_order(seller, "MSFT", Side::Sell, 295.0, 4, Funding::Cash)
        .unwrap();
    let outputs = ex
        .submit_limit_order(buyer, "MSFT", Side::Buy, 300.0, 4, Funding::Cash)
        .unwrap();

    let fills = trades(&outputs);
    assert_eq!(fills.len(), 1);
    assert_eq!((fills[0].price, fills[0].quantity), (295.0, 4));
    assert!(ex.top_of_book("MSFT").unwrap().is_empty());

    // The bid filled on arrival, so only the ask side changed.
    let eliminated = outputs
        .iter()
        .filter(|o| matches!(o, Response::TopOfBook(t) if t.eliminated))
        .count();
    assert_eq!(eliminated, 1);
}

#[test]
fn non_crossing_orders_rest() {
    let ex = exchange();
    let seller = ex.register_account("seller", None).unwrap();
    let buyer = ex.register_account("buyer", None).unwrap();
    ex.buy_market(seller, "AAPL", 1).unwrap();

    ex.submit_limit_order(seller, "AAPL", Side::Sell, 160.0, 1, Funding::Cash)
        .unwrap();
    let outputs = ex
        .submit_limit_order(buyer, "AAPL", Side::Buy, 159.99, 1, Funding::Cash)
        .unwrap();

    assert!(trades(&outputs).is_empty());
    let top = ex.top_of_book("AAPL").unwrap();
    assert_eq!(top.bid.unwrap().price, 159.99);
    assert_eq!(top.ask.unwrap().price, 160.0);
    assert!(!top.is_crossed());
}

#[test]
fn matching_never_leaves_a_crossed_book() {
    let ex = exchange();
    let mut rng = StdRng::seed_from_u64(2024);

    let mut traders = Vec::new();
    for i in 0..4 {
        let id = ex
            .register_account(&format!("trader{i}"), Some(1_000_000.0))
            .unwrap();
        ex.buy_market(id, "AAPL", 1_000).unwrap();
        traders.push(id);
    }

    for _ in 0..500 {
        let trader = traders[rng.gen_range(0..traders.len())];
        let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
        let price = (rng.gen_range(140.0..160.0_f64) * 100.0).round() / 100.0;
        let quantity = rng.gen_range(1..20);

        let result = ex.submit_limit_order(trader, "AAPL", side, price, quantity, Funding::Cash);
        if let Ok(outputs) = result {
            for trade in trades(&outputs) {
                assert!(trade.quantity > 0);
            }
        }

        assert!(!ex.top_of_book("AAPL").unwrap().is_crossed());
    }

    for trader in traders {
        assert_no_zero_holdings(&ex, trader);
        assert!(ex.balances(trader).unwrap().cash >= 0.0);
    }
}

#[test]
fn cancel_releases_escrow() {
    let ex = exchange();
    let a = ex.register_account("a", Some(5_000.0)).unwrap();
    let other = ex.register_account("other", None).unwrap();

    let outputs = ex
        .submit_limit_order(a, "AAPL", Side::Buy, 100.0, 10, Funding::Cash)
        .unwrap();
    let order_id = match &outputs[0] {
        Response::OrderAccepted { order_id, balances, .. } => {
            assert_eq!(balances.cash, 4_000.0);
            assert_eq!(balances.reserved_cash, 1_000.0);
            *order_id
        }
        other => panic!("unexpected response: {other:?}"),
    };

    // Only the owner may cancel.
    assert!(matches!(
        ex.cancel_order(other, order_id),
        Err(MarketError::NotFound { .. })
    ));

    let outputs = ex.cancel_order(a, order_id).unwrap();
    assert!(matches!(
        outputs[0],
        Response::CancelAck { remaining: 10, .. }
    ));
    let balances = ex.balances(a).unwrap();
    assert_eq!(balances.cash, 5_000.0);
    assert_eq!(balances.reserved_cash, 0.0);
    assert!(ex.best_bid("AAPL").unwrap().is_none());

    assert!(matches!(
        ex.cancel_order(a, order_id),
        Err(MarketError::NotFound { .. })
    ));
}

#[test]
fn cancelled_ask_returns_shares() {
    let ex = exchange();
    let a = ex.register_account("a", None).unwrap();
    ex.buy_market(a, "GOOG", 2).unwrap();

    let outputs = ex
        .submit_limit_order(a, "GOOG", Side::Sell, 3_000.0, 2, Funding::Cash)
        .unwrap();
    assert_eq!(ex.holding(a, "GOOG").unwrap(), 0);

    let order_id = match &outputs[0] {
        Response::OrderAccepted { order_id, .. } => *order_id,
        other => panic!("unexpected response: {other:?}"),
    };
    ex.cancel_order(a, order_id).unwrap();
    assert_eq!(ex.holding(a, "GOOG").unwrap(), 2);
}

#[test]
fn limit_orders_are_validated_before_escrow() {
    let ex = exchange();
    let a = ex.register_account("a", Some(1_000.0)).unwrap();

    for price in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            ex.submit_limit_order(a, "AAPL", Side::Buy, price, 1, Funding::Cash),
            Err(MarketError::InvalidAmount(_))
        ));
    }
    assert!(matches!(
        ex.submit_limit_order(a, "AAPL", Side::Buy, 10.0, 0, Funding::Cash),
        Err(MarketError::InvalidAmount(_))
    ));
    assert!(matches!(
        ex.submit_limit_order(a, "AAPL", Side::Buy, 200.0, 10, Funding::Cash),
        Err(MarketError::InsufficientFunds { .. })
    ));
    assert!(matches!(
        ex.submit_limit_order(a, "AAPL", Side::Sell, 200.0, 1, Funding::Cash),
        Err(MarketError::InsufficientShares { .. })
    ));

    assert_eq!(ex.balances(a).unwrap().cash, 1_000.0);
    assert!(ex.top_of_book("AAPL").unwrap().is_empty());
}

#[test]
fn margin_funded_bid_books_debt_on_fill() {
    let ex = exchange();
    let seller = ex.register_account("seller", None).unwrap();
    let buyer = ex.register_account("buyer", Some(1_000.0)).unwrap();
    ex.buy_market(seller, "AAPL", 10).unwrap();

    ex.submit_limit_order(buyer, "AAPL", Side::Buy, 150.0, 10, Funding::Margin)
        .unwrap();
    let reserved = ex.balances(buyer).unwrap();
    assert_eq!(reserved.cash, 1_000.0);
    assert_eq!(reserved.margin_balance, 500.0);
    assert_eq!(reserved.reserved_margin, 1_500.0);

    let outputs = ex
        .submit_limit_order(seller, "AAPL", Side::Sell, 145.0, 10, Funding::Cash)
        .unwrap();
    assert_eq!(trades(&outputs).len(), 1);

    // Incoming ask still trades at its own (lower) price.
    let balances = ex.balances(buyer).unwrap();
    assert_eq!(balances.cash, 1_000.0);
    assert_eq!(balances.debt, 1_450.0);
    assert_eq!(balances.margin_balance, 550.0);
    assert_eq!(balances.reserved_margin, 0.0);
    assert_eq!(ex.holding(buyer, "AAPL").unwrap(), 10);
}

#[test]
fn self_trade_settles_against_own_escrow() {
    let ex = exchange();
    let a = ex.register_account("a", None).unwrap();
    ex.buy_market(a, "MSFT", 3).unwrap();
    let cash = ex.balances(a).unwrap().cash;

    ex.submit_limit_order(a, "MSFT", Side::Sell, 300.0, 3, Funding::Cash)
        .unwrap();
    let outputs = ex
        .submit_limit_order(a, "MSFT", Side::Buy, 300.0, 3, Funding::Cash)
        .unwrap();

    assert_eq!(trades(&outputs).len(), 1);
    assert_eq!(ex.holding(a, "MSFT").unwrap(), 3);
    assert_eq!(ex.balances(a).unwrap().cash, cash);
}

#[test]
fn margin_and_short_scenarios() {
    let ex = exchange();
    let a = ex.register_account("a", Some(1_000.0)).unwrap();

    let confirmation = ex.buy_on_margin(a, "AAPL", 10).unwrap();
    assert_eq!(confirmation.balances.cash, 1_000.0);
    assert_eq!(confirmation.balances.debt, 1_500.0);
    assert_eq!(confirmation.balances.margin_balance, 500.0);

    assert!(matches!(
        ex.buy_on_margin(a, "AAPL", 10),
        Err(MarketError::InsufficientMargin { .. })
    ));

    ex.add_funds(a, 2_000.0).unwrap();
    assert!(matches!(ex.add_funds(a, -1.0), Err(MarketError::InvalidAmount(_))));

    // Margin pool is independent of later deposits.
    assert_eq!(ex.balances(a).unwrap().margin_balance, 500.0);

    let confirmation = ex.short_sell(a, "MSFT", 1).unwrap();
    assert_eq!(confirmation.balances.cash, 3_300.0);
    assert_eq!(confirmation.balances.debt, 1_800.0);
    assert_eq!(ex.holding(a, "MSFT").unwrap(), -1);

    let confirmation = ex.cover_short(a, "MSFT", 1).unwrap();
    assert_eq!(confirmation.balances.cash, 3_000.0);
    assert_eq!(confirmation.balances.debt, 1_500.0);
    assert_eq!(ex.holding(a, "MSFT").unwrap(), 0);
}

#[test]
fn shares_escrowed_in_an_ask_block_a_short() {
    let ex = exchange();
    let a = ex.register_account("a", Some(10_000.0)).unwrap();
    ex.buy_market(a, "AAPL", 10).unwrap();

    let outputs = ex
        .submit_limit_order(a, "AAPL", Side::Sell, 500.0, 10, Funding::Cash)
        .unwrap();
    let order_id = match &outputs[0] {
        Response::OrderAccepted { order_id, .. } => *order_id,
        other => panic!("unexpected response: {other:?}"),
    };
    assert_eq!(ex.holding(a, "AAPL").unwrap(), 0);

    assert!(matches!(
        ex.short_sell(a, "AAPL", 5),
        Err(MarketError::PositionConflict { .. })
    ));

    ex.cancel_order(a, order_id).unwrap();
    assert_eq!(ex.holding(a, "AAPL").unwrap(), 10);

    let balances = ex.balances(a).unwrap();
    assert_eq!(balances.debt, 0.0);
    assert_eq!(balances.margin_balance, 20_000.0);
    assert_eq!(balances.cash, 8_500.0);
    let liability = ex
        .accounts()
        .with_account(a, |acct| Ok(acct.short_liability("AAPL")))
        .unwrap();
    assert_eq!(liability, 0.0);
}

#[test]
fn partially_filled_bid_cancel_returns_the_rest() {
    let ex = exchange();
    let seller = ex.register_account("seller", None).unwrap();
    let buyer = ex.register_account("buyer", Some(1_000.0)).unwrap();
    ex.buy_market(seller, "AAPL", 1).unwrap();

    let outputs = ex
        .submit_limit_order(buyer, "AAPL", Side::Buy, 0.3, 3, Funding::Cash)
        .unwrap();
    let order_id = match &outputs[0] {
        Response::OrderAccepted { order_id, .. } => *order_id,
        other => panic!("unexpected response: {other:?}"),
    };
    ex.submit_limit_order(seller, "AAPL", Side::Sell, 0.1, 1, Funding::Cash)
        .unwrap();
    assert_eq!(ex.holding(buyer, "AAPL").unwrap(), 1);

    ex.cancel_order(buyer, order_id).unwrap();
    let balances = ex.balances(buyer).unwrap();
    assert_eq!(balances.reserved_cash, 0.0);
    assert!((balances.cash - 999.9).abs() < 1e-9);
}

#[test]
fn extreme_volatility_does_not_break_the_feed() {
    let config = ExchangeConfig {
        volatility: f64::MAX,
        ..ExchangeConfig::default()
    };
    let ex = Exchange::new(config);
    let mut rng = StdRng::seed_from_u64(11);

    for _ in 0..100 {
        for quote in ex.tick(&mut rng) {
            assert!(quote.price.is_finite());
            assert!(quote.price >= 0.01);
        }
    }
}

#[test]
fn portfolio_value_tracks_current_prices() {
    let ex = exchange();
    let a = ex.register_account("a", None).unwrap();
    ex.buy_market(a, "AAPL", 10).unwrap();
    ex.buy_market(a, "MSFT", 2).unwrap();
    assert_eq!(ex.portfolio_value(a).unwrap(), 10.0 * 150.0 + 2.0 * 300.0);

    ex.price_feed().set_price("AAPL", 160.0).unwrap();
    assert_eq!(ex.portfolio_value(a).unwrap(), 10.0 * 160.0 + 2.0 * 300.0);
}

#[test]
fn analytics_and_indicators() {
    let ex = exchange();
    let analytics = ex.analytics().unwrap();
    assert_eq!(analytics.top_performer.symbol, "GOOG");
    assert_eq!(analytics.worst_performer.symbol, "AAPL");

    ex.price_feed().set_price("AAPL", 152.0).unwrap();
    ex.price_feed().set_price("AAPL", 154.0).unwrap();
    let indicators = ex.indicators("AAPL", 3).unwrap();
    assert_eq!(indicators.sma, Some(152.0));
    assert!(indicators.ema.is_some());
    assert_eq!(ex.indicators("AAPL", 4).unwrap().sma, None);
}

#[test]
fn concurrent_ticks_and_trading_keep_invariants() {
    let ex = exchange();
    let accounts: Vec<AccountId> = (0..4)
        .map(|i| ex.register_account(&format!("t{i}"), Some(1_000_000.0)).unwrap())
        .collect();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            let mut rng = StdRng::seed_from_u64(1);
            for _ in 0..2_000 {
                ex.tick(&mut rng);
            }
        });

        for (i, &account) in accounts.iter().enumerate() {
            let ex = &ex;
            scope.spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + i as u64);
                for _ in 0..200 {
                    let qty = rng.gen_range(1..5);
                    ex.buy_market(account, "AAPL", qty).unwrap();
                    let price = ex.current_price("AAPL").unwrap();
                    let _ = ex.submit_limit_order(account, "AAPL", Side::Sell, price, qty, Funding::Cash);
                    let _ = ex.submit_limit_order(account, "AAPL", Side::Buy, price, qty, Funding::Cash);
                }
            });
        }
    });

    assert!(!ex.top_of_book("AAPL").unwrap().is_crossed());
    for quote in ex.quotes() {
        assert!(quote.price > 0.0);
    }
    for account in accounts {
        assert_no_zero_holdings(&ex, account);
        let balances = ex.balances(account).unwrap();
        assert!(balances.cash >= 0.0);
        assert!(balances.reserved_cash >= 0.0);
    }
}
