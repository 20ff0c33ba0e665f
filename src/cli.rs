//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvTickSource;
use crate::adapters::csv_journal::CsvJournal;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_gateway::PaperGateway;
use crate::domain::aggregator::{CandleSeries, Ingest, SealedCandleEvent};
use crate::domain::candle::SeriesKey;
use crate::domain::config::{EngineConfig, KNOWN_SECTIONS};
use crate::domain::error::EngineError;
use crate::domain::tick::Tick;
use crate::engine::{Engine, EngineSummary};
use crate::ports::journal_port::JournalPort;
use crate::ports::order_gateway::OrderGateway;
use crate::ports::tick_source::TickSource;

#[derive(Parser, Debug)]
#[command(name = "lanetrader", about = "Intraday signal and position engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a tick file through the engine against the paper gateway
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        ticks: PathBuf,
        /// Write closed trades to this CSV file
        #[arg(short, long)]
        journal: Option<PathBuf>,
        /// Only replay ticks for this instrument
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Print the sealed candles of a tick file as CSV
    Candles {
        #[arg(short, long)]
        ticks: PathBuf,
        #[arg(long, default_value_t = 5)]
        timeframe: u32,
        #[arg(long)]
        instrument: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Replay {
            config,
            ticks,
            journal,
            instrument,
        } => run_replay(&config, &ticks, journal.as_ref(), instrument.as_deref()),
        Command::Candles {
            ticks,
            timeframe,
            instrument,
        } => run_candles(&ticks, timeframe, instrument.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_ticks(path: &PathBuf, instrument: Option<&str>) -> Result<Vec<Tick>, EngineError> {
    let mut source = CsvTickSource::new(path.clone());
    if let Some(instrument) = instrument {
        source = source.for_instrument(instrument);
    }
    source.load_ticks()
}

fn run_replay(
    config_path: &PathBuf,
    ticks_path: &PathBuf,
    journal_path: Option<&PathBuf>,
    instrument: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match EngineConfig::from_port(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("Loading ticks from {}", ticks_path.display());
    let ticks = match load_ticks(ticks_path, instrument) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!("Replaying {} ticks...", ticks.len());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let err = EngineError::Io(e);
            eprintln!("error: {err}");
            return (&err).into();
        }
    };
    let summary = match runtime.block_on(replay(config, ticks, Arc::new(PaperGateway::new()))) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    print!("{}", format_summary(&summary));

    if let Some(path) = journal_path {
        if let Err(e) = CsvJournal::new(path.clone()).write_trades(&summary.trades) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("Journal written to {}", path.display());
    }
    ExitCode::SUCCESS
}

/// Feeds `ticks` in order through a fresh engine and shuts it down once
/// every lane has drained.
pub async fn replay(
    config: EngineConfig,
    ticks: Vec<Tick>,
    gateway: Arc<dyn OrderGateway>,
) -> Result<EngineSummary, EngineError> {
    let mut engine = Engine::start(config, gateway);
    for tick in ticks {
        engine.submit(tick).await?;
    }
    Ok(engine.shutdown().await)
}

pub fn format_summary(summary: &EngineSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Ticks:            {}\n", summary.ticks));
    out.push_str(&format!("Stale ticks:      {}\n", summary.stale_ticks));
    out.push_str(&format!("Rejected ticks:   {}\n", summary.rejected_ticks));
    out.push_str(&format!("Candles sealed:   {}\n", summary.candles_sealed));
    out.push_str(&format!("Signals:          {}\n", summary.signals));
    out.push_str(&format!("Trades:           {}\n", summary.trades.len()));
    out.push_str(&format!("Open positions:   {}\n", summary.open_positions.len()));
    out.push_str(&format!("Realized PnL:     {:.2}\n", summary.realized_pnl));
    for trade in &summary.trades {
        out.push_str(&format!(
            "  {} {} {} x{} {:.2} -> {:.2} ({}) pnl {:.2}\n",
            trade.closed_at.format("%Y-%m-%d %H:%M:%S"),
            trade.instrument,
            trade.side,
            trade.qty,
            trade.entry_price,
            trade.exit_price,
            trade.exit_reason,
            trade.pnl
        ));
    }
    out
}

fn run_candles(ticks_path: &PathBuf, timeframe: u32, instrument: Option<&str>) -> ExitCode {
    if timeframe == 0 {
        let err = EngineError::invalid("session", "timeframes", "timeframe must be positive");
        eprintln!("error: {err}");
        return (&err).into();
    }
    let ticks = match load_ticks(ticks_path, instrument) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let sealed = seal_candles(&ticks, timeframe);
    print!("{}", format_candles(&sealed));
    ExitCode::SUCCESS
}

/// Aggregates `ticks` per instrument and returns every sealed candle,
/// including the final partial candle of each series.
pub fn seal_candles(ticks: &[Tick], timeframe: u32) -> Vec<SealedCandleEvent> {
    let mut series: Vec<CandleSeries> = Vec::new();
    let mut sealed = Vec::new();
    for tick in ticks {
        let idx = match series
            .iter()
            .position(|s| s.key().instrument == tick.instrument)
        {
            Some(i) => i,
            None => {
                series.push(CandleSeries::new(SeriesKey::new(
                    tick.instrument.clone(),
                    timeframe,
                )));
                series.len() - 1
            }
        };
        if let Ingest::Sealed(event) = series[idx].ingest(tick) {
            sealed.push(event);
        }
    }
    for s in &mut series {
        if let Some(event) = s.flush() {
            sealed.push(event);
        }
    }
    sealed
}

pub fn format_candles(sealed: &[SealedCandleEvent]) -> String {
    let mut out = String::from("instrument,timeframe,bucket_start,open,high,low,close\n");
    for event in sealed {
        let c = &event.candle;
        out.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            event.key.instrument,
            event.key.timeframe_minutes,
            c.bucket_start.to_rfc3339(),
            c.open,
            c.high,
            c.low,
            c.close
        ));
    }
    out
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let config = match EngineConfig::from_port(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nRisk:");
    eprintln!(
        "  tp {:.2}%  sl {:.2}%  trail {:.2}%",
        config.risk.tp_pct * 100.0,
        config.risk.sl_pct * 100.0,
        config.risk.trail_pct * 100.0
    );
    eprintln!(
        "  max trades/day {}  max open {}  square-off {}",
        config.risk.max_trades_per_day,
        config.risk.max_open_positions,
        config.risk.squareoff_time.format("%H:%M")
    );
    eprintln!("\nSession:");
    eprintln!(
        "  timeframes {:?}  utc offset {}m",
        config.session.timeframes, config.session.utc_offset_minutes
    );
    eprintln!("\nIndicators:");
    for indicator in config.indicators.indicator_types() {
        eprintln!("  {indicator}");
    }
    eprintln!(
        "  lookback {} candles  squeeze {:?}",
        config.indicators.required_lookback(),
        config.indicators.squeeze_mode
    );

    for section in adapter.unknown_sections(KNOWN_SECTIONS) {
        eprintln!("\nwarning: unknown section [{section}] ignored");
    }

    eprintln!("\n{} is valid.", adapter.source());
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn tick(instrument: &str, h: u32, m: u32, s: u32, price: f64) -> Tick {
        Tick::new(
            instrument,
            price,
            Utc.with_ymd_and_hms(2024, 1, 15, h, m, s).unwrap(),
        )
    }

    #[test]
    fn cli_parses_replay() {
        let cli = Cli::try_parse_from([
            "lanetrader",
            "replay",
            "--config",
            "lt.ini",
            "--ticks",
            "ticks.csv",
            "--journal",
            "out.csv",
        ])
        .unwrap();
        match cli.command {
            Command::Replay {
                config,
                ticks,
                journal,
                instrument,
            } => {
                assert_eq!(config, PathBuf::from("lt.ini"));
                assert_eq!(ticks, PathBuf::from("ticks.csv"));
                assert_eq!(journal, Some(PathBuf::from("out.csv")));
                assert_eq!(instrument, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn candles_timeframe_defaults_to_five() {
        let cli = Cli::try_parse_from(["lanetrader", "candles", "-t", "ticks.csv"]).unwrap();
        assert!(matches!(cli.command, Command::Candles { timeframe: 5, .. }));
    }

    #[test]
    fn seal_candles_keeps_instruments_apart() {
        let ticks = vec![
            tick("A", 3, 45, 0, 100.0),
            tick("B", 3, 45, 10, 50.0),
            tick("A", 3, 47, 0, 101.0),
            tick("A", 3, 50, 0, 102.0),
            tick("B", 3, 51, 0, 49.0),
        ];
        let sealed = seal_candles(&ticks, 5);
        let keys: Vec<_> = sealed
            .iter()
            .map(|e| (e.key.instrument.as_str(), e.candle.close))
            .collect();
        // A 03:45 seals on the 03:50 tick; B 03:45 on its 03:51 tick;
        // the open candles flush at the end.
        assert_eq!(
            keys,
            vec![("A", 101.0), ("B", 50.0), ("A", 102.0), ("B", 49.0)]
        );
    }

    #[test]
    fn format_candles_has_header() {
        let sealed = seal_candles(&[tick("A", 3, 45, 0, 100.0)], 5);
        let out = format_candles(&sealed);
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("instrument,timeframe,bucket_start,open,high,low,close")
        );
        assert_eq!(
            lines.next(),
            Some("A,5,2024-01-15T03:45:00+00:00,100,100,100,100")
        );
    }

    #[test]
    fn summary_lists_trades() {
        let summary = EngineSummary {
            ticks: 10,
            realized_pnl: 12.345,
            ..EngineSummary::default()
        };
        let out = format_summary(&summary);
        assert!(out.contains("Ticks:            10"));
        assert!(out.contains("Realized PnL:     12.35"));
    }
}
