//! Property tests: sealed candles and their indicator snapshots never change
//! once published, whatever ticks arrive later.

mod common;

use chrono::Duration;
use common::*;
use lanetrader::domain::aggregator::{CandleSeries, Ingest};
use lanetrader::domain::candle::SeriesKey;
use lanetrader::domain::config::EngineConfig;
use lanetrader::domain::indicator::snapshot::compute;
use lanetrader::domain::tick::Tick;
use lanetrader::engine::lane::{Evaluation, LanePipeline};
use proptest::prelude::*;

/// Ticks with mostly forward steps and the occasional late print.
fn tick_stream() -> impl Strategy<Value = Vec<Tick>> {
    prop::collection::vec((-90i64..240, 90.0f64..110.0), 1..400).prop_map(|steps| {
        let mut at = session_open();
        steps
            .into_iter()
            .map(|(step, price)| {
                at += Duration::seconds(step);
                Tick::new("NIFTY", price, at)
            })
            .collect()
    })
}

fn sealed_closes(ticks: &[Tick], timeframe: u32) -> Vec<(usize, f64, f64, f64, f64)> {
    let mut series = CandleSeries::new(SeriesKey::new("NIFTY", timeframe));
    let mut out = Vec::new();
    for tick in ticks {
        if let Ingest::Sealed(event) = series.ingest(tick) {
            let c = event.candle;
            out.push((event.index, c.open, c.high, c.low, c.close));
        }
    }
    out
}

proptest! {
    #[test]
    fn later_ticks_never_rewrite_sealed_candles(
        ticks in tick_stream(),
        cut in 0usize..400,
        timeframe in prop::sample::select(vec![1u32, 3, 5]),
    ) {
        let cut = cut.min(ticks.len());
        let full = sealed_closes(&ticks, timeframe);
        let prefix = sealed_closes(&ticks[..cut], timeframe);
        prop_assert!(prefix.len() <= full.len());
        prop_assert_eq!(&full[..prefix.len()], &prefix[..]);
    }

    #[test]
    fn sealed_buckets_strictly_increase(ticks in tick_stream()) {
        let mut series = CandleSeries::new(SeriesKey::new("NIFTY", 1));
        for tick in &ticks {
            series.ingest(tick);
        }
        series.flush();
        let closed = series.closed();
        prop_assert!(closed.iter().all(|c| c.sealed));
        prop_assert!(closed.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
    }

    #[test]
    fn snapshot_depends_only_on_history(ticks in tick_stream()) {
        let indicators = fast_indicators();
        let mut series = CandleSeries::new(SeriesKey::new("NIFTY", 1));
        let mut published = Vec::new();
        for tick in &ticks {
            if let Ingest::Sealed(event) = series.ingest(tick) {
                if let Some(s) = compute(series.closed(), &indicators).snapshot() {
                    published.push((event.index, s.clone()));
                }
            }
        }
        series.flush();

        let closed = series.closed();
        for (index, snapshot) in published {
            let again = compute(&closed[..=index], &indicators);
            prop_assert_eq!(again.snapshot(), Some(&snapshot));
        }
    }

    #[test]
    fn pipeline_replay_is_idempotent(ticks in tick_stream()) {
        let config = EngineConfig {
            indicators: fast_indicators(),
            ..EngineConfig::default()
        };
        let run = || {
            let mut pipeline = LanePipeline::new(SeriesKey::new("NIFTY", 1));
            let mut evaluations: Vec<Evaluation> = Vec::new();
            for tick in &ticks {
                if let Ingest::Sealed(event) = pipeline.ingest(tick) {
                    evaluations.push(pipeline.evaluate(&event, &config));
                }
            }
            evaluations
        };
        prop_assert_eq!(run(), run());
    }
}
