//! Position lifecycle: take-profit, stop-loss and the trailing stop.

use chrono::{DateTime, Utc};
use std::fmt;

use super::config::RiskConfig;
use super::signal::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    SquareOff,
    Panic,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
            ExitReason::SquareOff => "square_off",
            ExitReason::Panic => "panic",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub instrument: String,
    /// Timeframe of the lane whose signal opened the position.
    pub timeframe: u32,
    pub side: Side,
    pub qty: u64,
    pub entry_price: f64,
    pub tp_price: f64,
    pub sl_price: f64,
    /// Best price seen since entry: highest for BUY, lowest for SELL.
    pub trailing_extreme: f64,
    pub status: PositionStatus,
    pub order_ref: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        instrument: impl Into<String>,
        timeframe: u32,
        side: Side,
        qty: u64,
        entry_price: f64,
        risk: &RiskConfig,
        order_ref: impl Into<String>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let (tp_price, sl_price) = match side {
            Side::Buy => (
                entry_price * (1.0 + risk.tp_pct),
                entry_price * (1.0 - risk.sl_pct),
            ),
            Side::Sell => (
                entry_price * (1.0 - risk.tp_pct),
                entry_price * (1.0 + risk.sl_pct),
            ),
        };
        Position {
            instrument: instrument.into(),
            timeframe,
            side,
            qty,
            entry_price,
            tp_price,
            sl_price,
            trailing_extreme: entry_price,
            status: PositionStatus::Open,
            order_ref: order_ref.into(),
            opened_at,
            closed_at: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.side == Side::Buy
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Moves the trailing extreme and tightens the stop. Returns true when the
    /// stop moved. The stop never loosens; `trail_pct == 0` disables trailing.
    pub fn update_trailing(&mut self, price: f64, trail_pct: f64) -> bool {
        if trail_pct <= 0.0 {
            return false;
        }
        let before = self.sl_price;
        match self.side {
            Side::Buy => {
                self.trailing_extreme = self.trailing_extreme.max(price);
                self.sl_price = self.sl_price.max(self.trailing_extreme * (1.0 - trail_pct));
            }
            Side::Sell => {
                self.trailing_extreme = self.trailing_extreme.min(price);
                self.sl_price = self.sl_price.min(self.trailing_extreme * (1.0 + trail_pct));
            }
        }
        self.sl_price != before
    }

    pub fn should_stop_loss(&self, price: f64) -> bool {
        if self.is_long() {
            price <= self.sl_price
        } else {
            price >= self.sl_price
        }
    }

    pub fn should_take_profit(&self, price: f64) -> bool {
        if self.is_long() {
            price >= self.tp_price
        } else {
            price <= self.tp_price
        }
    }

    /// Price-driven exit at `price`, take-profit checked first.
    pub fn exit_trigger(&self, price: f64) -> Option<ExitReason> {
        if self.should_take_profit(price) {
            Some(ExitReason::TakeProfit)
        } else if self.should_stop_loss(price) {
            Some(ExitReason::StopLoss)
        } else {
            None
        }
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.realized_pnl(price)
    }

    /// `(exit - entry) * qty * sign(side)`.
    pub fn realized_pnl(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.qty as f64 * self.side.sign()
    }

    /// Marks the position closed and produces its journal record.
    pub fn close(&mut self, exit_price: f64, reason: ExitReason, at: DateTime<Utc>) -> ClosedTrade {
        self.status = PositionStatus::Closed;
        self.closed_at = Some(at);
        ClosedTrade {
            instrument: self.instrument.clone(),
            timeframe: self.timeframe,
            side: self.side,
            qty: self.qty,
            entry_price: self.entry_price,
            exit_price,
            opened_at: self.opened_at,
            closed_at: at,
            pnl: self.realized_pnl(exit_price),
            exit_reason: reason,
            order_ref: self.order_ref.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub instrument: String,
    pub timeframe: u32,
    pub side: Side,
    pub qty: u64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub pnl: f64,
    pub exit_reason: ExitReason,
    pub order_ref: String,
}
