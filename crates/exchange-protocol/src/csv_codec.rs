//! CSV line codec.
//!
//! Input format (lines → [`Request`]); `user` is a username:
//!
//! - Register:        `R, user[, cash]`
//! - Add funds:       `D, user, amount`
//! - Buy (market):    `B, user, symbol, qty`
//! - Sell (market):   `S, user, symbol, qty`
//! - Margin buy:      `M, user, symbol, qty`
//! - Short sell:      `X, user, symbol, qty`
//! - Cover short:     `V, user, symbol, qty`
//! - Limit order:     `N, user, symbol, price, qty, side(B/S)[, funding(C/M)]`
//! - Cancel:          `C, user, orderId`
//! - Quote:           `Q, symbol`
//! - List market:     `L`
//! - Portfolio:       `P, user`
//! - History:         `H, user`
//! - Top of book:     `T, symbol`
//! - Analytics:       `A`
//! - Indicators:      `I, symbol, period`
//!
//! Output format ([`Response`] → one or more lines):
//!
//! - Registered:      `R, accountId, user, cash, margin`
//! - Confirmed:       `OK, cash, margin, debt, message`
//! - Order accepted:  `O, orderId, symbol, side, price, qty, funding`
//! - Cancel ack:      `C, orderId, symbol, remaining`
//! - Trade:           `T, symbol, buyOrderId, buyerId, sellOrderId, sellerId, price, qty`
//! - Top of book:     `B, symbol, side, price, totalQty` (`-, -` when eliminated)
//! - Quote:           `Q, symbol, price` (one line per quote for a listing)
//! - Portfolio:       `P, user, cash, margin, debt, totalValue`
//!                    followed by `POS, symbol, qty, reserved, price, value`
//! - History:         `H, user, timestamp, description` per record
//! - Analytics:       `A, topSymbol, topPrice, worstSymbol, worstPrice`
//! - Indicators:      `I, symbol, period, sma, ema` (`-` when unavailable)
//! - Rejected:        `E, code, message`
//! - Invalid request: `E, invalid_request, reason`
//!
//! Free-text fields (messages, descriptions) always come last so they may
//! contain commas.

use std::str::FromStr;

use exchange_core::{Funding, OrderId, Request, Response, Side};

use crate::ProtocolError;

/// Parse a single CSV line into a [`Request`].
///
/// Returns `Ok(None)` for blank lines and comments (starting with `#`).
pub fn parse_input_line(line: &str) -> Result<Option<Request>, ProtocolError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let tokens = split_and_trim(trimmed, ',');
    let msg_type = tokens[0].to_ascii_uppercase();

    let request = match msg_type.as_str() {
        "R" => parse_register(&tokens)?,
        "D" => {
            expect_fields("add funds", "3", &tokens, 3)?;
            Request::AddFunds {
                username: tokens[1].clone(),
                amount: parse_field("amount", &tokens[2])?,
            }
        }
        "B" | "S" | "M" | "X" | "V" => parse_market_order(&msg_type, &tokens)?,
        "N" => parse_limit_order(&tokens)?,
        "C" => {
            expect_fields("cancel", "3", &tokens, 3)?;
            Request::Cancel {
                username: tokens[1].clone(),
                order_id: OrderId(parse_field("order id", &tokens[2])?),
            }
        }
        "Q" => {
            expect_fields("quote", "2", &tokens, 2)?;
            Request::Quote {
                symbol: symbol(&tokens[1]),
            }
        }
        "L" => {
            expect_fields("list market", "1", &tokens, 1)?;
            Request::ListMarket
        }
        "P" => {
            expect_fields("portfolio", "2", &tokens, 2)?;
            Request::Portfolio {
                username: tokens[1].clone(),
            }
        }
        "H" => {
            expect_fields("history", "2", &tokens, 2)?;
            Request::History {
                username: tokens[1].clone(),
            }
        }
        "T" => {
            expect_fields("top of book", "2", &tokens, 2)?;
            Request::TopOfBook {
                symbol: symbol(&tokens[1]),
            }
        }
        "A" => {
            expect_fields("analytics", "1", &tokens, 1)?;
            Request::Analytics
        }
        "I" => {
            expect_fields("indicators", "3", &tokens, 3)?;
            Request::Indicators {
                symbol: symbol(&tokens[1]),
                period: parse_field("period", &tokens[2])?,
            }
        }
        _ => return Err(ProtocolError::UnknownMessageType(tokens[0].clone())),
    };

    Ok(Some(request))
}

fn parse_register(tokens: &[String]) -> Result<Request, ProtocolError> {
    // R, user[, cash]
    match tokens.len() {
        2 => Ok(Request::Register {
            username: tokens[1].clone(),
            cash: None,
        }),
        3 => Ok(Request::Register {
            username: tokens[1].clone(),
            cash: Some(parse_field("cash", &tokens[2])?),
        }),
        got => Err(ProtocolError::FieldCount {
            kind: "register",
            expected: "2 or 3",
            got,
        }),
    }
}

fn parse_market_order(msg_type: &str, tokens: &[String]) -> Result<Request, ProtocolError> {
    // <type>, user, symbol, qty
    expect_fields("market order", "4", tokens, 4)?;

    let username = tokens[1].clone();
    let symbol = symbol(&tokens[2]);
    let quantity = parse_field("quantity", &tokens[3])?;

    Ok(match msg_type {
        "B" => Request::BuyMarket { username, symbol, quantity },
        "S" => Request::SellMarket { username, symbol, quantity },
        "M" => Request::BuyOnMargin { username, symbol, quantity },
        "X" => Request::ShortSell { username, symbol, quantity },
        _ => Request::CoverShort { username, symbol, quantity },
    })
}

fn parse_limit_order(tokens: &[String]) -> Result<Request, ProtocolError> {
    // N, user, symbol, price, qty, side[, funding]
    if tokens.len() != 6 && tokens.len() != 7 {
        return Err(ProtocolError::FieldCount {
            kind: "limit order",
            expected: "6 or 7",
            got: tokens.len(),
        });
    }

    let side = single_char(&tokens[5])
        .and_then(Side::from_char)
        .ok_or_else(|| invalid("side", &tokens[5]))?;

    let funding = match tokens.get(6) {
        Some(tok) => single_char(tok)
            .and_then(Funding::from_char)
            .ok_or_else(|| invalid("funding", tok))?,
        None => Funding::Cash,
    };

    Ok(Request::SubmitLimit {
        username: tokens[1].clone(),
        symbol: symbol(&tokens[2]),
        side,
        price: parse_field("price", &tokens[3])?,
        quantity: parse_field("quantity", &tokens[4])?,
        funding,
    })
}

/// Format a [`Response`] as one or more CSV lines (joined with `\n`).
pub fn format_output(msg: &Response) -> String {
    match msg {
        Response::Registered {
            account,
            username,
            balances,
        } => format!(
            "R, {}, {}, {:.2}, {:.2}",
            account, username, balances.cash, balances.margin_balance
        ),
        Response::Confirmed(c) => format!(
            "OK, {:.2}, {:.2}, {:.2}, {}",
            c.balances.cash, c.balances.margin_balance, c.balances.debt, c.message
        ),
        Response::OrderAccepted {
            order_id,
            symbol,
            side,
            price,
            quantity,
            funding,
            ..
        } => format!(
            "O, {}, {}, {}, {:.2}, {}, {}",
            order_id,
            symbol,
            side.as_char(),
            price,
            quantity,
            funding.as_char()
        ),
        Response::CancelAck {
            order_id,
            symbol,
            remaining,
        } => format!("C, {}, {}, {}", order_id, symbol, remaining),
        Response::Trade(t) => format!(
            "T, {}, {}, {}, {}, {}, {:.2}, {}",
            t.symbol, t.buy_order, t.buyer, t.sell_order, t.seller, t.price, t.quantity
        ),
        Response::TopOfBook(t) => {
            if t.eliminated {
                format!("B, {}, {}, -, -", t.symbol, t.side.as_char())
            } else {
                format!(
                    "B, {}, {}, {:.2}, {}",
                    t.symbol,
                    t.side.as_char(),
                    t.price,
                    t.total_quantity
                )
            }
        }
        Response::Quote(q) => format!("Q, {}, {:.2}", q.symbol, q.price),
        Response::Quotes { quotes } => quotes
            .iter()
            .map(|q| format!("Q, {}, {:.2}", q.symbol, q.price))
            .collect::<Vec<_>>()
            .join("\n"),
        Response::Portfolio(p) => {
            let mut lines = vec![format!(
                "P, {}, {:.2}, {:.2}, {:.2}, {:.2}",
                p.username, p.balances.cash, p.balances.margin_balance, p.balances.debt, p.total_value
            )];
            lines.extend(p.positions.iter().map(|pos| {
                format!(
                    "POS, {}, {}, {}, {:.2}, {:.2}",
                    pos.symbol, pos.quantity, pos.reserved, pos.price, pos.value
                )
            }));
            lines.join("\n")
        }
        Response::History { username, records } => {
            if records.is_empty() {
                return format!("H, {}, -, -", username);
            }
            records
                .iter()
                .map(|r| format!("H, {}, {}, {}", username, r.at.to_rfc3339(), r.description))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Response::Analytics(a) => format!(
            "A, {}, {:.2}, {}, {:.2}",
            a.top_performer.symbol,
            a.top_performer.price,
            a.worst_performer.symbol,
            a.worst_performer.price
        ),
        Response::Indicators(i) => format!(
            "I, {}, {}, {}, {}",
            i.symbol,
            i.period,
            optional_price(i.sma),
            optional_price(i.ema)
        ),
        Response::Rejected { error } => format!("E, {}, {}", error.code(), error),
        Response::InvalidRequest { reason } => format!("E, invalid_request, {}", reason),
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn split_and_trim(s: &str, delimiter: char) -> Vec<String> {
    s.split(delimiter).map(|tok| tok.trim().to_string()).collect()
}

fn expect_fields(
    kind: &'static str,
    expected: &'static str,
    tokens: &[String],
    count: usize,
) -> Result<(), ProtocolError> {
    if tokens.len() == count {
        Ok(())
    } else {
        Err(ProtocolError::FieldCount {
            kind,
            expected,
            got: tokens.len(),
        })
    }
}

fn parse_field<T: FromStr>(field: &'static str, tok: &str) -> Result<T, ProtocolError> {
    tok.parse::<T>().map_err(|_| invalid(field, tok))
}

fn invalid(field: &'static str, tok: &str) -> ProtocolError {
    ProtocolError::InvalidField {
        field,
        value: tok.to_string(),
    }
}

fn single_char(tok: &str) -> Option<char> {
    let mut chars = tok.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Symbols are case-insensitive on input.
fn symbol(tok: &str) -> String {
    tok.to_ascii_uppercase()
}

fn optional_price(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}", v),
        None => "-".to_string(),
    }
}
