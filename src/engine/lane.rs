//! One sequential lane per `(instrument, timeframe)`.
//!
//! A lane drains its tick channel one tick at a time: ingest, seal, compute,
//! validate, then position update, all before the next tick is taken.
//! Commands are polled first on every iteration, so a panic exit or
//! square-off is handled before any tick still queued behind it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::aggregator::{CandleSeries, Ingest, SealedCandleEvent};
use crate::domain::candle::SeriesKey;
use crate::domain::config::EngineConfig;
use crate::domain::indicator::snapshot::{compute, IndicatorSnapshot, Reading};
use crate::domain::position::ExitReason;
use crate::domain::signal::{validate, Signal, Verdict};
use crate::domain::tick::Tick;
use crate::engine::events::{Diagnostic, EngineEvent, EventBus};
use crate::engine::manager::PositionManager;

/// Operator commands, delivered to every lane.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Close everything now and block new entries until `Resume`.
    PanicExit,
    SquareOff,
    SetTrading { instrument: String, enabled: bool },
    Resume,
}

/// Counters a lane reports when it exits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneReport {
    pub key: Option<SeriesKey>,
    pub ticks: u64,
    pub candles_sealed: u64,
    pub signals: u64,
    pub stale_ticks: u64,
    pub rejected_ticks: u64,
}

/// The synchronous half of a lane: candle series plus the last snapshot.
#[derive(Debug)]
pub struct LanePipeline {
    series: CandleSeries,
    prev: Option<IndicatorSnapshot>,
}

/// What a sealed candle led to.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    NotReady { have: usize, need: usize },
    Quiet,
    Conflict,
    Signal(Signal),
}

impl LanePipeline {
    pub fn new(key: SeriesKey) -> Self {
        LanePipeline {
            series: CandleSeries::new(key),
            prev: None,
        }
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    pub fn ingest(&mut self, tick: &Tick) -> Ingest {
        self.series.ingest(tick)
    }

    pub fn flush(&mut self) -> Option<SealedCandleEvent> {
        self.series.flush()
    }

    /// Runs indicators and the validator for a freshly sealed candle.
    ///
    /// Indicators see only the last [`EngineConfig::history_window`] sealed
    /// candles, and older ones are trimmed. EMA and Wilder averages are seeded
    /// at the start of that window, so the window is kept several lookbacks
    /// long for the seed to have decayed by the last candle.
    pub fn evaluate(&mut self, sealed: &SealedCandleEvent, config: &EngineConfig) -> Evaluation {
        let window = config.history_window();
        let reading = compute(self.series.recent(window), &config.indicators);
        self.series.trim_to(window);
        let snapshot = match reading {
            Reading::Ready(snapshot) => IndicatorSnapshot {
                candle_index: sealed.index,
                ..snapshot
            },
            Reading::InsufficientData { have, need } => {
                self.prev = None;
                return Evaluation::NotReady { have, need };
            }
        };

        let verdict = match &self.prev {
            Some(prev) if prev.candle_index + 1 == snapshot.candle_index => {
                validate(prev, &snapshot, &sealed.candle, &config.signal)
            }
            _ => Verdict::NoSignal,
        };
        self.prev = Some(snapshot);

        match verdict {
            Verdict::Signal(side) => Evaluation::Signal(Signal {
                key: sealed.key.clone(),
                side,
                candle_bucket_start: sealed.candle.bucket_start,
                close: sealed.candle.close,
            }),
            Verdict::Conflict => Evaluation::Conflict,
            Verdict::NoSignal => Evaluation::Quiet,
        }
    }
}

pub(crate) struct Lane {
    pipeline: LanePipeline,
    ticks: mpsc::Receiver<Tick>,
    commands: broadcast::Receiver<Command>,
    config: watch::Receiver<Arc<EngineConfig>>,
    manager: Arc<PositionManager>,
    events: EventBus,
    last_tick_at: Option<DateTime<Utc>>,
    report: LaneReport,
}

impl Lane {
    pub(crate) fn new(
        key: SeriesKey,
        ticks: mpsc::Receiver<Tick>,
        commands: broadcast::Receiver<Command>,
        config: watch::Receiver<Arc<EngineConfig>>,
        manager: Arc<PositionManager>,
        events: EventBus,
    ) -> Self {
        Lane {
            report: LaneReport {
                key: Some(key.clone()),
                ..LaneReport::default()
            },
            pipeline: LanePipeline::new(key),
            ticks,
            commands,
            config,
            manager,
            events,
            last_tick_at: None,
        }
    }

    fn key(&self) -> &SeriesKey {
        self.pipeline.series.key()
    }

    pub(crate) async fn run(mut self) -> LaneReport {
        debug!(series = %self.key(), "lane started");
        let mut commands_open = true;
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv(), if commands_open => match command {
                    Ok(command) => self.handle_command(command).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!(series = %self.key(), missed, "lane missed commands");
                    }
                    Err(RecvError::Closed) => commands_open = false,
                },
                tick = self.ticks.recv() => match tick {
                    Some(tick) => self.handle_tick(tick).await,
                    None => break,
                },
            }
        }

        if let Some(sealed) = self.pipeline.flush() {
            self.report.candles_sealed += 1;
            self.events.emit(EngineEvent::CandleSealed(sealed));
        }
        info!(
            series = %self.key(),
            ticks = self.report.ticks,
            candles = self.report.candles_sealed,
            signals = self.report.signals,
            "lane stopped"
        );
        self.report
    }

    async fn handle_tick(&mut self, tick: Tick) {
        let config = self.config.borrow().clone();
        self.report.ticks += 1;

        match self.pipeline.ingest(&tick) {
            Ingest::Updated => {}
            Ingest::Rejected => {
                self.report.rejected_ticks += 1;
                self.events.diagnostic(Diagnostic::InvalidTick {
                    instrument: tick.instrument.clone(),
                    price: tick.price,
                });
                return;
            }
            Ingest::Stale(stale) => {
                self.report.stale_ticks += 1;
                self.events.diagnostic(Diagnostic::StaleTick(stale));
                return;
            }
            Ingest::Sealed(sealed) => {
                self.report.candles_sealed += 1;
                self.events.emit(EngineEvent::CandleSealed(sealed.clone()));
                self.on_sealed(&sealed, &tick, &config).await;
            }
        }

        self.last_tick_at = Some(tick.timestamp);
        self.manager.on_tick(&tick, &config).await;
        self.manager.square_off_if_due(tick.timestamp, &config).await;
    }

    async fn on_sealed(&mut self, sealed: &SealedCandleEvent, tick: &Tick, config: &EngineConfig) {
        match self.pipeline.evaluate(sealed, config) {
            Evaluation::NotReady { have, need } => {
                debug!(series = %sealed.key, have, need, "indicators warming up");
            }
            Evaluation::Quiet => {}
            Evaluation::Conflict => {
                self.events.diagnostic(Diagnostic::ValidatorConflict {
                    key: sealed.key.clone(),
                    bucket_start: sealed.candle.bucket_start,
                });
            }
            Evaluation::Signal(signal) => {
                self.report.signals += 1;
                self.events.emit(EngineEvent::SignalEmitted(signal.clone()));
                self.manager.on_signal(&signal, tick.timestamp, config).await;
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        let config = self.config.borrow().clone();
        let at = self.last_tick_at.unwrap_or_else(Utc::now);
        let instrument = self.key().instrument.clone();
        match command {
            Command::PanicExit => {
                self.manager.halt();
                self.manager
                    .force_close(&instrument, ExitReason::Panic, None, at, &config)
                    .await;
            }
            Command::SquareOff => {
                self.manager
                    .force_close(&instrument, ExitReason::SquareOff, None, at, &config)
                    .await;
            }
            // applied by the engine before broadcast
            Command::SetTrading { .. } | Command::Resume => {}
        }
    }
}
