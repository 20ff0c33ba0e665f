//! Position & risk manager.
//!
//! One slot per instrument, each behind its own async mutex. Lanes of
//! different instruments never wait on each other; lanes of the same
//! instrument (several timeframes) share the slot, so there is at most one
//! open position per instrument. The only cross-instrument state is the
//! daily trade counter, the open-position count and the halt flag, all
//! lock-free.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::config::EngineConfig;
use crate::domain::error::GatewayError;
use crate::domain::position::{ClosedTrade, ExitReason, Position};
use crate::domain::signal::{Side, Signal};
use crate::domain::tick::Tick;
use crate::domain::trade_counter::DailyTradeCounter;
use crate::engine::events::{Diagnostic, EngineEvent, EventBus, SkipReason};
use crate::ports::order_gateway::{OrderGateway, OrderRequest, OrderStatus};

/// Entry order whose fate the gateway could not confirm.
#[derive(Debug, Clone)]
struct UnresolvedEntry {
    client_ref: String,
    instrument: String,
    timeframe: u32,
    side: Side,
    qty: u64,
    day: NaiveDate,
    at: DateTime<Utc>,
}

#[derive(Debug)]
struct Slot {
    position: Option<Position>,
    trading_enabled: bool,
    /// Exit that could not be completed; retried on the next tick.
    pending_exit: Option<ExitReason>,
    /// Close order that timed out unresolved. No other close is placed
    /// until the gateway reports it dead.
    unresolved_exit: Option<String>,
    /// Blocks entries on the instrument until the gateway settles it.
    unresolved_entry: Option<UnresolvedEntry>,
    last_price: Option<f64>,
    closed: Vec<ClosedTrade>,
    realized_pnl: f64,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            position: None,
            trading_enabled: true,
            pending_exit: None,
            unresolved_exit: None,
            unresolved_entry: None,
            last_price: None,
            closed: Vec::new(),
            realized_pnl: 0.0,
        }
    }
}

/// Result of handing a signal to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Opened(Position),
    Skipped(SkipReason),
    /// The entry order failed and every reservation was rolled back.
    Failed,
    /// The entry order timed out and its fate is unknown.
    Unresolved,
}

/// How an order placement ended after timeout reconciliation.
enum Placement {
    Filled { order_ref: String, price: f64 },
    Rejected,
    Failed,
    Unknown,
}

/// Answer to a single status query for an unresolved order.
enum Resolution {
    Filled(f64),
    /// Rejected, or never reached the broker.
    Dead,
    Pending,
}

pub struct PositionManager {
    gateway: Arc<dyn OrderGateway>,
    slots: DashMap<String, Arc<Mutex<Slot>>>,
    counter: DailyTradeCounter,
    open_count: AtomicUsize,
    halted: AtomicBool,
    squared_off_day: std::sync::Mutex<Option<NaiveDate>>,
    /// Per-instrument order sequence, so refs do not depend on lane interleaving.
    order_seq: DashMap<String, u64>,
    events: EventBus,
}

impl PositionManager {
    pub fn new(gateway: Arc<dyn OrderGateway>, events: EventBus) -> Self {
        PositionManager {
            gateway,
            slots: DashMap::new(),
            counter: DailyTradeCounter::new(),
            open_count: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
            squared_off_day: std::sync::Mutex::new(None),
            order_seq: DashMap::new(),
            events,
        }
    }

    fn slot(&self, instrument: &str) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(instrument.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn existing_slot(&self, instrument: &str) -> Option<Arc<Mutex<Slot>>> {
        self.slots.get(instrument).map(|s| s.value().clone())
    }

    fn next_ref(&self, instrument: &str) -> String {
        let mut seq = self.order_seq.entry(instrument.to_string()).or_insert(0);
        *seq += 1;
        format!("LT-{instrument}-{:06}", *seq)
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::Acquire)
    }

    pub fn trades_today(&self, instrument: &str, day: NaiveDate) -> u32 {
        self.counter.count(instrument, day)
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Blocks new entries until [`resume`](Self::resume).
    pub fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.halted.store(false, Ordering::Release);
    }

    pub async fn set_trading(&self, instrument: &str, enabled: bool) {
        let slot = self.slot(instrument);
        slot.lock().await.trading_enabled = enabled;
        debug!(instrument, enabled, "trading toggled");
    }

    fn skip(&self, signal: &Signal, reason: SkipReason) -> EntryOutcome {
        self.events.diagnostic(Diagnostic::EntrySkipped {
            instrument: signal.key.instrument.clone(),
            side: signal.side,
            reason,
        });
        EntryOutcome::Skipped(reason)
    }

    /// Opens a position for `signal` if every gate passes. `at` is the time
    /// of the tick that sealed the signal candle.
    pub async fn on_signal(
        &self,
        signal: &Signal,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> EntryOutcome {
        let risk = &config.risk;
        let instrument = signal.key.instrument.as_str();

        if self.is_halted() {
            return self.skip(signal, SkipReason::Halted);
        }
        if config.session.is_past_squareoff(at, risk.squareoff_time) {
            return self.skip(signal, SkipReason::PastSquareOff);
        }
        if signal.side == Side::Sell && !risk.allow_shorting {
            return self.skip(signal, SkipReason::ShortingDisabled);
        }

        let slot = self.slot(instrument);
        let mut slot = slot.lock().await;

        if !slot.trading_enabled {
            return self.skip(signal, SkipReason::TradingDisabled);
        }
        self.reconcile_entry(&mut slot, config).await;
        if slot.unresolved_entry.is_some() {
            return self.skip(signal, SkipReason::EntryUnresolved);
        }
        if slot.position.is_some() {
            return self.skip(signal, SkipReason::PositionOpen);
        }
        let qty = risk.quantity_for(signal.close);
        if qty == 0 {
            return self.skip(signal, SkipReason::ZeroQuantity);
        }

        let max_open = risk.max_open_positions;
        if self
            .open_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max_open).then_some(n + 1)
            })
            .is_err()
        {
            return self.skip(signal, SkipReason::MaxOpenPositions);
        }

        let day = config.session.trading_day(at);
        if !self
            .counter
            .try_reserve(instrument, day, risk.max_trades_per_day)
        {
            self.open_count.fetch_sub(1, Ordering::AcqRel);
            return self.skip(signal, SkipReason::DailyCapReached);
        }

        let request = OrderRequest {
            client_ref: self.next_ref(instrument),
            instrument: instrument.to_string(),
            side: signal.side,
            qty,
            reference_price: signal.close,
        };

        match self.place(&request, config, 1).await {
            Placement::Filled { order_ref, price } => {
                let position = Position::open(
                    instrument,
                    signal.key.timeframe_minutes,
                    signal.side,
                    qty,
                    price,
                    risk,
                    order_ref,
                    at,
                );
                slot.position = Some(position.clone());
                self.events
                    .emit(EngineEvent::PositionOpened(position.clone()));
                EntryOutcome::Opened(position)
            }
            Placement::Rejected | Placement::Failed => {
                self.rollback_entry(instrument, day);
                EntryOutcome::Failed
            }
            Placement::Unknown => {
                // Both reservations stay held until the order is settled.
                self.events.diagnostic(Diagnostic::OperatorAlert {
                    instrument: instrument.to_string(),
                    message: format!(
                        "entry order {} unresolved, entries blocked until the broker settles it",
                        request.client_ref
                    ),
                });
                slot.unresolved_entry = Some(UnresolvedEntry {
                    client_ref: request.client_ref,
                    instrument: request.instrument,
                    timeframe: signal.key.timeframe_minutes,
                    side: signal.side,
                    qty,
                    day,
                    at,
                });
                EntryOutcome::Unresolved
            }
        }
    }

    /// Asks the gateway once about an order that timed out unresolved.
    async fn resolve(&self, order_ref: &str, config: &EngineConfig) -> Resolution {
        match self
            .gateway
            .status_timeout(order_ref, config.gateway.timeout)
            .await
        {
            Ok(OrderStatus::Filled(price)) => Resolution::Filled(price),
            Ok(OrderStatus::Rejected) | Err(GatewayError::UnknownOrder { .. }) => Resolution::Dead,
            Ok(OrderStatus::Pending) => Resolution::Pending,
            Err(err) => {
                debug!(order_ref, %err, "status poll failed");
                Resolution::Pending
            }
        }
    }

    /// Settles an unresolved entry: adopts the position if it filled,
    /// releases its reservations if it died, otherwise leaves it blocking.
    async fn reconcile_entry(&self, slot: &mut Slot, config: &EngineConfig) {
        let Some(entry) = slot.unresolved_entry.clone() else {
            return;
        };
        match self.resolve(&entry.client_ref, config).await {
            Resolution::Pending => {}
            Resolution::Dead => {
                slot.unresolved_entry = None;
                self.rollback_entry(&entry.instrument, entry.day);
                debug!(order_ref = %entry.client_ref, "unresolved entry never filled");
            }
            Resolution::Filled(price) => {
                slot.unresolved_entry = None;
                let position = Position::open(
                    entry.instrument,
                    entry.timeframe,
                    entry.side,
                    entry.qty,
                    price,
                    &config.risk,
                    entry.client_ref,
                    entry.at,
                );
                slot.position = Some(position.clone());
                self.events.emit(EngineEvent::PositionOpened(position));
            }
        }
    }

    fn rollback_entry(&self, instrument: &str, day: NaiveDate) {
        self.counter.release(instrument, day);
        self.open_count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Places one order and, on timeout, reconciles it through `status`.
    async fn place(&self, request: &OrderRequest, config: &EngineConfig, attempt: u32) -> Placement {
        let gateway = &config.gateway;
        let error = match self
            .gateway
            .place_timeout(request, gateway.timeout)
            .await
        {
            Ok(ack) => {
                return Placement::Filled {
                    order_ref: ack.order_ref,
                    price: ack.fill_price,
                };
            }
            Err(error) => error,
        };

        self.events.diagnostic(Diagnostic::GatewayFailure {
            instrument: request.instrument.clone(),
            order_ref: request.client_ref.clone(),
            attempt,
            error: error.clone(),
        });
        if !matches!(error, GatewayError::Timeout { .. }) {
            return Placement::Failed;
        }

        for poll in 0..gateway.status_poll_attempts {
            match self
                .gateway
                .status_timeout(&request.client_ref, gateway.timeout)
                .await
            {
                Ok(OrderStatus::Filled(price)) => {
                    return Placement::Filled {
                        order_ref: request.client_ref.clone(),
                        price,
                    };
                }
                Ok(OrderStatus::Rejected) => return Placement::Rejected,
                Ok(OrderStatus::Pending) => {}
                Err(GatewayError::UnknownOrder { .. }) => {
                    // never reached the broker
                    return Placement::Failed;
                }
                Err(err) => {
                    debug!(order_ref = %request.client_ref, %err, "status poll failed");
                }
            }
            tokio::time::sleep(gateway.backoff_delay(poll)).await;
        }

        self.events.diagnostic(Diagnostic::UnreconciledOrder {
            instrument: request.instrument.clone(),
            order_ref: request.client_ref.clone(),
        });
        Placement::Unknown
    }

    /// Trails the stop and exits on take-profit, stop-loss or square-off.
    /// A previously failed exit is retried here, and an unresolved entry is
    /// polled once.
    pub async fn on_tick(&self, tick: &Tick, config: &EngineConfig) -> Option<ClosedTrade> {
        let slot = self.existing_slot(&tick.instrument)?;
        let mut slot = slot.lock().await;
        slot.last_price = Some(tick.price);
        self.reconcile_entry(&mut slot, config).await;
        let position = slot.position.as_mut()?;

        if position.update_trailing(tick.price, config.risk.trail_pct) {
            self.events.emit(EngineEvent::StopTightened {
                instrument: position.instrument.clone(),
                sl_price: position.sl_price,
                trailing_extreme: position.trailing_extreme,
            });
        }

        let reason = slot.pending_exit.or_else(|| {
            if config
                .session
                .is_past_squareoff(tick.timestamp, config.risk.squareoff_time)
            {
                Some(ExitReason::SquareOff)
            } else {
                slot.position.as_ref()?.exit_trigger(tick.price)
            }
        })?;

        self.close_locked(&mut slot, tick.price, reason, tick.timestamp, config)
            .await
    }

    /// Closes the instrument's position, if any, regardless of price levels.
    /// Without an explicit `price` the last seen tick price is used.
    pub async fn force_close(
        &self,
        instrument: &str,
        reason: ExitReason,
        price: Option<f64>,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Option<ClosedTrade> {
        let slot = self.existing_slot(instrument)?;
        let mut slot = slot.lock().await;
        self.reconcile_entry(&mut slot, config).await;
        let entry_price = slot.position.as_ref()?.entry_price;
        let price = price.or(slot.last_price).unwrap_or(entry_price);
        self.close_locked(&mut slot, price, reason, at, config).await
    }

    /// Closes every open position, one instrument at a time.
    pub async fn close_all(
        &self,
        reason: ExitReason,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Vec<ClosedTrade> {
        let mut instruments: Vec<String> = self.slots.iter().map(|s| s.key().clone()).collect();
        instruments.sort();
        let mut closed = Vec::new();
        for instrument in instruments {
            if let Some(trade) = self.force_close(&instrument, reason, None, at, config).await {
                closed.push(trade);
            }
        }
        closed
    }

    /// Squares off every position once per trading day, the first time a
    /// tick at or after the deadline is seen.
    pub async fn square_off_if_due(
        &self,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Vec<ClosedTrade> {
        if !config
            .session
            .is_past_squareoff(at, config.risk.squareoff_time)
        {
            return Vec::new();
        }
        let day = config.session.trading_day(at);
        {
            let Ok(mut done) = self.squared_off_day.lock() else {
                return Vec::new();
            };
            if *done == Some(day) {
                return Vec::new();
            }
            *done = Some(day);
        }
        self.close_all(ExitReason::SquareOff, at, config).await
    }

    async fn close_locked(
        &self,
        slot: &mut Slot,
        price: f64,
        reason: ExitReason,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Option<ClosedTrade> {
        let (instrument, side, qty) = {
            let position = slot.position.as_ref()?;
            (position.instrument.clone(), position.side, position.qty)
        };

        if let Some(order_ref) = slot.unresolved_exit.clone() {
            match self.resolve(&order_ref, config).await {
                Resolution::Filled(fill) => {
                    slot.unresolved_exit = None;
                    return self.finish_close(slot, fill, reason, at);
                }
                Resolution::Dead => {
                    slot.unresolved_exit = None;
                    debug!(%order_ref, "unresolved exit never filled, placing a new one");
                }
                Resolution::Pending => {
                    slot.pending_exit = Some(reason);
                    return None;
                }
            }
        }

        let max_attempts = config.gateway.close_max_attempts.max(1);
        for attempt in 0..max_attempts {
            let request = OrderRequest {
                client_ref: self.next_ref(&instrument),
                instrument: instrument.clone(),
                side: side.opposite(),
                qty,
                reference_price: price,
            };
            match self.place(&request, config, attempt + 1).await {
                Placement::Filled { price: fill, .. } => {
                    return self.finish_close(slot, fill, reason, at);
                }
                Placement::Unknown => {
                    // polled before any further close is placed
                    slot.unresolved_exit = Some(request.client_ref);
                    break;
                }
                Placement::Rejected | Placement::Failed => {
                    if attempt + 1 < max_attempts {
                        tokio::time::sleep(config.gateway.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        warn!(instrument = %instrument, %reason, "exit not completed, retrying on next tick");
        slot.pending_exit = Some(reason);
        self.events.diagnostic(Diagnostic::OperatorAlert {
            instrument,
            message: format!("failed to close position ({reason}), will retry on next tick"),
        });
        None
    }

    fn finish_close(
        &self,
        slot: &mut Slot,
        fill: f64,
        reason: ExitReason,
        at: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let mut position = slot.position.take()?;
        let trade = position.close(fill, reason, at);
        slot.pending_exit = None;
        slot.realized_pnl += trade.pnl;
        slot.closed.push(trade.clone());
        self.open_count.fetch_sub(1, Ordering::AcqRel);
        self.events.emit(EngineEvent::PositionClosed(trade.clone()));
        Some(trade)
    }

    /// Retries every exit still pending, at the last seen price. Lets a
    /// failed close make progress when no ticks arrive.
    pub async fn retry_pending_exits(
        &self,
        at: DateTime<Utc>,
        config: &EngineConfig,
    ) -> Vec<ClosedTrade> {
        let mut closed = Vec::new();
        for slot in self.snapshot_slots() {
            let mut slot = slot.lock().await;
            let Some(reason) = slot.pending_exit else {
                continue;
            };
            let Some(price) = slot
                .last_price
                .or_else(|| slot.position.as_ref().map(|p| p.entry_price))
            else {
                continue;
            };
            if let Some(trade) = self.close_locked(&mut slot, price, reason, at, config).await {
                closed.push(trade);
            }
        }
        closed
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        let mut positions = Vec::new();
        for slot in self.snapshot_slots() {
            if let Some(position) = slot.lock().await.position.clone() {
                positions.push(position);
            }
        }
        positions.sort_by(|a, b| a.instrument.cmp(&b.instrument));
        positions
    }

    /// Closed trades of every instrument, in close order.
    pub async fn closed_trades(&self) -> Vec<ClosedTrade> {
        let mut trades = Vec::new();
        for slot in self.snapshot_slots() {
            trades.extend(slot.lock().await.closed.iter().cloned());
        }
        trades.sort_by(|a, b| {
            a.closed_at
                .cmp(&b.closed_at)
                .then_with(|| a.instrument.cmp(&b.instrument))
        });
        trades
    }

    pub async fn realized_pnl(&self, instrument: &str) -> f64 {
        match self.existing_slot(instrument) {
            Some(slot) => slot.lock().await.realized_pnl,
            None => 0.0,
        }
    }

    fn snapshot_slots(&self) -> Vec<Arc<Mutex<Slot>>> {
        self.slots.iter().map(|s| s.value().clone()).collect()
    }
}
