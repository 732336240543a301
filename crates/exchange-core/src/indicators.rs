//! Moving averages over a price history.

use serde::{Deserialize, Serialize};

/// Simple moving average of the last `period` prices.
///
/// `None` if `period` is zero or the history is shorter than `period`.
pub fn sma(history: &[f64], period: usize) -> Option<f64> {
    let window = window(history, period)?;
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average of the last `period` prices, seeded with the
/// first price of the window and smoothed with `k = 2 / (period + 1)`.
pub fn ema(history: &[f64], period: usize) -> Option<f64> {
    let window = window(history, period)?;
    let k = 2.0 / (period as f64 + 1.0);

    let (first, rest) = window.split_first()?;
    Some(rest.iter().fold(*first, |ema, price| price * k + ema * (1.0 - k)))
}

fn window(history: &[f64], period: usize) -> Option<&[f64]> {
    if period == 0 || history.len() < period {
        return None;
    }
    Some(&history[history.len() - period..])
}

/// SMA / EMA pair for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub symbol: String,
    pub period: usize,
    pub sma: Option<f64>,
    pub ema: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_uses_trailing_window() {
        let history = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&history, 2), Some(3.5));
        assert_eq!(sma(&history, 4), Some(2.5));
    }

    #[test]
    fn short_history_has_no_average() {
        assert_eq!(sma(&[1.0], 2), None);
        assert_eq!(ema(&[1.0], 2), None);
        assert_eq!(sma(&[1.0], 0), None);
    }

    #[test]
    fn ema_weights_recent_prices() {
        // k = 2/3: 10 -> 20*2/3 + 10/3 = 16.666..
        let value = ema(&[10.0, 20.0], 2).unwrap();
        assert!((value - 50.0 / 3.0).abs() < 1e-9);
    }
}
