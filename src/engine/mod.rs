//! Async runtime around the domain pipeline.
//!
//! [`Engine`] owns one lane task per `(instrument, timeframe)`, spawned on
//! the first tick for that instrument. Ticks go to lanes over bounded mpsc
//! channels, commands over a broadcast channel and configuration over a
//! watch channel, so a reload is picked up by every lane at its next tick.
//!
//! A replay engine ([`Engine::start`]) keeps time by tick timestamps alone.
//! A live engine ([`Engine::start_live`]) also runs a wall-clock ticker for
//! the square-off deadline.

pub mod events;
pub mod lane;
pub mod manager;
mod ticker;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::candle::SeriesKey;
use crate::domain::config::EngineConfig;
use crate::domain::error::EngineError;
use crate::domain::position::{ClosedTrade, Position};
use crate::domain::tick::Tick;
use crate::ports::clock::Clock;
use crate::ports::config_port::ConfigPort;
use crate::ports::order_gateway::OrderGateway;

use events::EventBus;
use lane::{Command, Lane, LaneReport};
use manager::PositionManager;
use ticker::SquareOffTicker;

const COMMAND_CAPACITY: usize = 64;

/// Totals reported by [`Engine::shutdown`].
#[derive(Debug, Clone, Default)]
pub struct EngineSummary {
    pub ticks: u64,
    pub candles_sealed: u64,
    pub signals: u64,
    pub stale_ticks: u64,
    pub rejected_ticks: u64,
    pub trades: Vec<ClosedTrade>,
    pub open_positions: Vec<Position>,
    pub realized_pnl: f64,
    pub lanes: Vec<LaneReport>,
}

pub struct Engine {
    timeframes: Vec<u32>,
    config_tx: watch::Sender<Arc<EngineConfig>>,
    commands: broadcast::Sender<Command>,
    lanes: HashMap<SeriesKey, mpsc::Sender<Tick>>,
    handles: Vec<JoinHandle<LaneReport>>,
    ticker: Option<JoinHandle<()>>,
    lane_capacity: usize,
    manager: Arc<PositionManager>,
    events: EventBus,
}

impl Engine {
    /// Reads and validates configuration, then starts the engine. Missing
    /// risk parameters are refused here.
    pub fn from_port(
        config: &dyn ConfigPort,
        gateway: Arc<dyn OrderGateway>,
    ) -> Result<Self, EngineError> {
        Ok(Self::start(EngineConfig::from_port(config)?, gateway))
    }

    /// Starts a replay engine with an already validated configuration.
    /// Square-off is checked against tick timestamps only. Must be called
    /// inside a tokio runtime.
    pub fn start(config: EngineConfig, gateway: Arc<dyn OrderGateway>) -> Self {
        let events = EventBus::new(config.sizing.event_capacity);
        let (commands, _) = broadcast::channel(COMMAND_CAPACITY);
        let timeframes = config.session.timeframes.clone();
        let lane_capacity = config.sizing.lane_capacity;
        let manager = Arc::new(PositionManager::new(gateway, events.clone()));
        info!(
            timeframes = ?config.session.timeframes,
            max_open = config.risk.max_open_positions,
            "engine started"
        );
        let (config_tx, _) = watch::channel(Arc::new(config));
        Engine {
            timeframes,
            lane_capacity,
            config_tx,
            commands,
            lanes: HashMap::new(),
            handles: Vec::new(),
            ticker: None,
            manager,
            events,
        }
    }

    /// Starts a live engine. Besides tick timestamps, square-off is checked
    /// against `clock` every second, and pending exits are retried on the
    /// same schedule.
    pub fn start_live(
        config: EngineConfig,
        gateway: Arc<dyn OrderGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut engine = Self::start(config, gateway);
        let ticker = SquareOffTicker::new(
            clock,
            Arc::clone(&engine.manager),
            engine.config_tx.subscribe(),
            engine.commands.subscribe(),
        );
        engine.ticker = Some(tokio::spawn(ticker.run()));
        engine
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn manager(&self) -> &Arc<PositionManager> {
        &self.manager
    }

    pub fn config(&self) -> Arc<EngineConfig> {
        self.config_tx.borrow().clone()
    }

    /// Replaces the configuration for every lane. Timeframes and channel
    /// sizes are fixed at start and keep their original values.
    pub fn reload(&self, config: EngineConfig) {
        info!("configuration reloaded");
        self.config_tx.send_replace(Arc::new(config));
    }

    /// Routes a tick to every timeframe lane of its instrument. Waits when a
    /// lane's queue is full.
    pub async fn submit(&mut self, tick: Tick) -> Result<(), EngineError> {
        let timeframes = self.timeframes.clone();
        for timeframe in timeframes {
            let key = SeriesKey::new(tick.instrument.clone(), timeframe);
            let sender = self.lane_sender(key.clone());
            sender
                .send(tick.clone())
                .await
                .map_err(|_| EngineError::LaneClosed {
                    instrument: key.instrument.clone(),
                    timeframe: key.timeframe_minutes,
                })?;
        }
        Ok(())
    }

    fn lane_sender(&mut self, key: SeriesKey) -> mpsc::Sender<Tick> {
        if let Some(sender) = self.lanes.get(&key) {
            return sender.clone();
        }
        let (tx, rx) = mpsc::channel(self.lane_capacity.max(1));
        let lane = Lane::new(
            key.clone(),
            rx,
            self.commands.subscribe(),
            self.config_tx.subscribe(),
            Arc::clone(&self.manager),
            self.events.clone(),
        );
        self.handles.push(tokio::spawn(lane.run()));
        self.lanes.insert(key, tx.clone());
        tx
    }

    /// Applies an operator command. Halt, resume and trading toggles take
    /// effect immediately; panic exit and square-off are broadcast so each
    /// lane closes its instrument before taking its next tick.
    pub async fn command(&self, command: Command) {
        info!(?command, "command issued");
        match &command {
            Command::PanicExit => self.manager.halt(),
            Command::Resume => self.manager.resume(),
            Command::SetTrading {
                instrument,
                enabled,
            } => self.manager.set_trading(instrument, *enabled).await,
            Command::SquareOff => {}
        }
        let _ = self.commands.send(command);
    }

    /// Closes every lane's queue, waits for queued ticks to drain and
    /// current candles to flush, then reports totals.
    pub async fn shutdown(self) -> EngineSummary {
        let Engine {
            lanes,
            handles,
            ticker,
            manager,
            commands,
            ..
        } = self;
        drop(lanes);

        let mut summary = EngineSummary::default();
        for handle in handles {
            match handle.await {
                Ok(report) => {
                    summary.ticks += report.ticks;
                    summary.candles_sealed += report.candles_sealed;
                    summary.signals += report.signals;
                    summary.stale_ticks += report.stale_ticks;
                    summary.rejected_ticks += report.rejected_ticks;
                    summary.lanes.push(report);
                }
                Err(err) => error!(%err, "lane task failed"),
            }
        }
        drop(commands);
        if let Some(ticker) = ticker {
            if let Err(err) = ticker.await {
                error!(%err, "square-off ticker failed");
            }
        }

        summary.trades = manager.closed_trades().await;
        summary.open_positions = manager.open_positions().await;
        summary.realized_pnl = summary.trades.iter().map(|t| t.pnl).sum();
        summary.lanes.sort_by(|a, b| a.key.cmp(&b.key));
        info!(
            ticks = summary.ticks,
            candles = summary.candles_sealed,
            trades = summary.trades.len(),
            pnl = summary.realized_pnl,
            "engine stopped"
        );
        summary
    }
}
