//! Entry signal validation over two consecutive indicator snapshots.
//!
//! BUY needs all of: supertrend flip Down→Up, close above the Bollinger
//! mid, RSI above the buy threshold, positive MACD histogram, no squeeze.
//! SELL is the mirror image. If both rule-sets pass, nothing is emitted.

use chrono::{DateTime, Utc};
use std::fmt;

use super::candle::{Candle, SeriesKey};
use super::indicator::snapshot::IndicatorSnapshot;
use super::indicator::Trend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for BUY, -1 for SELL.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub key: SeriesKey,
    pub side: Side,
    pub candle_bucket_start: DateTime<Utc>,
    /// Close of the candle the signal was evaluated on.
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRules {
    pub rsi_buy_threshold: f64,
    pub rsi_sell_threshold: f64,
}

impl Default for SignalRules {
    fn default() -> Self {
        SignalRules {
            rsi_buy_threshold: 60.0,
            rsi_sell_threshold: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Signal(Side),
    NoSignal,
    /// Both rule-sets passed; nothing is emitted.
    Conflict,
}

pub fn validate(
    prev: &IndicatorSnapshot,
    last: &IndicatorSnapshot,
    candle: &Candle,
    rules: &SignalRules,
) -> Verdict {
    let buy = prev.supertrend_direction == Trend::Down
        && last.supertrend_direction == Trend::Up
        && candle.close > last.bb_mid
        && last.rsi > rules.rsi_buy_threshold
        && last.macd_hist > 0.0
        && !last.squeeze;

    let sell = prev.supertrend_direction == Trend::Up
        && last.supertrend_direction == Trend::Down
        && candle.close < last.bb_mid
        && last.rsi < rules.rsi_sell_threshold
        && last.macd_hist < 0.0
        && !last.squeeze;

    match (buy, sell) {
        (true, true) => Verdict::Conflict,
        (true, false) => Verdict::Signal(Side::Buy),
        (false, true) => Verdict::Signal(Side::Sell),
        (false, false) => Verdict::NoSignal,
    }
}
