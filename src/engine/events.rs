//! Engine events and the broadcast bus that carries them.
//!
//! Emitting never blocks a lane: the bus is a bounded
//! `tokio::sync::broadcast` channel, so a receiver that falls behind loses
//! the oldest events and sees `RecvError::Lagged`. Every event is also
//! written to the `tracing` log as it is emitted.

use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::domain::aggregator::{SealedCandleEvent, StaleTick};
use crate::domain::candle::SeriesKey;
use crate::domain::error::GatewayError;
use crate::domain::position::{ClosedTrade, Position};
use crate::domain::signal::{Side, Signal};

/// Why a validated signal did not open a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PositionOpen,
    DailyCapReached,
    MaxOpenPositions,
    TradingDisabled,
    Halted,
    PastSquareOff,
    ZeroQuantity,
    ShortingDisabled,
    EntryUnresolved,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::PositionOpen => "position already open",
            SkipReason::DailyCapReached => "daily trade cap reached",
            SkipReason::MaxOpenPositions => "max open positions reached",
            SkipReason::TradingDisabled => "trading disabled for instrument",
            SkipReason::Halted => "engine halted by panic exit",
            SkipReason::PastSquareOff => "past square-off time",
            SkipReason::ZeroQuantity => "capital too small for one unit",
            SkipReason::ShortingDisabled => "shorting disabled",
            SkipReason::EntryUnresolved => "earlier entry order still unresolved",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    StaleTick(StaleTick),
    InvalidTick {
        instrument: String,
        price: f64,
    },
    ValidatorConflict {
        key: SeriesKey,
        bucket_start: DateTime<Utc>,
    },
    EntrySkipped {
        instrument: String,
        side: Side,
        reason: SkipReason,
    },
    GatewayFailure {
        instrument: String,
        order_ref: String,
        attempt: u32,
        error: GatewayError,
    },
    /// A placement timed out and its status could not be confirmed.
    UnreconciledOrder {
        instrument: String,
        order_ref: String,
    },
    OperatorAlert {
        instrument: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CandleSealed(SealedCandleEvent),
    SignalEmitted(Signal),
    PositionOpened(Position),
    StopTightened {
        instrument: String,
        sl_price: f64,
        trailing_extreme: f64,
    },
    PositionClosed(ClosedTrade),
    Diagnostic(Diagnostic),
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        EventBus { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Logs the event and hands it to current subscribers, if any.
    pub fn emit(&self, event: EngineEvent) {
        log_event(&event);
        let _ = self.tx.send(event);
    }

    pub fn diagnostic(&self, diagnostic: Diagnostic) {
        self.emit(EngineEvent::Diagnostic(diagnostic));
    }
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::CandleSealed(sealed) => debug!(
            series = %sealed.key,
            index = sealed.index,
            bucket_start = %sealed.candle.bucket_start,
            close = sealed.candle.close,
            "candle sealed"
        ),
        EngineEvent::SignalEmitted(signal) => info!(
            series = %signal.key,
            side = %signal.side,
            bucket_start = %signal.candle_bucket_start,
            "signal"
        ),
        EngineEvent::PositionOpened(position) => info!(
            instrument = %position.instrument,
            side = %position.side,
            qty = position.qty,
            entry = position.entry_price,
            tp = position.tp_price,
            sl = position.sl_price,
            order_ref = %position.order_ref,
            "position opened"
        ),
        EngineEvent::StopTightened {
            instrument,
            sl_price,
            ..
        } => debug!(instrument = %instrument, sl = sl_price, "stop tightened"),
        EngineEvent::PositionClosed(trade) => info!(
            instrument = %trade.instrument,
            reason = %trade.exit_reason,
            exit = trade.exit_price,
            pnl = trade.pnl,
            "position closed"
        ),
        EngineEvent::Diagnostic(diagnostic) => log_diagnostic(diagnostic),
    }
}

fn log_diagnostic(diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::StaleTick(stale) => warn!(
            series = %stale.key,
            tick_bucket = %stale.tick_bucket,
            current_bucket = %stale.current_bucket,
            "stale tick dropped"
        ),
        Diagnostic::InvalidTick { instrument, price } => {
            warn!(instrument = %instrument, price, "invalid tick dropped")
        }
        Diagnostic::ValidatorConflict { key, bucket_start } => warn!(
            series = %key,
            bucket_start = %bucket_start,
            "buy and sell rules both passed, signal suppressed"
        ),
        Diagnostic::EntrySkipped {
            instrument,
            side,
            reason,
        } => info!(instrument = %instrument, side = %side, %reason, "entry skipped"),
        Diagnostic::GatewayFailure {
            instrument,
            order_ref,
            attempt,
            error,
        } => warn!(
            instrument = %instrument,
            order_ref = %order_ref,
            attempt,
            %error,
            "gateway call failed"
        ),
        Diagnostic::UnreconciledOrder {
            instrument,
            order_ref,
        } => error!(
            instrument = %instrument,
            order_ref = %order_ref,
            "order state unknown after timeout"
        ),
        Diagnostic::OperatorAlert {
            instrument,
            message,
        } => error!(instrument = %instrument, "{message}"),
    }
}
