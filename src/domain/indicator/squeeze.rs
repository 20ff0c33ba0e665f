//! Volatility squeeze flag.
//!
//! `Keltner` mode: the squeeze is on when both Bollinger bands sit strictly
//! inside the Keltner channel `SMA(kc_period) ± kc_mult × ATR(kc_period)`.
//! `Stddev` mode: the squeeze is on when the Bollinger width is smaller than
//! `kc_mult × stddev(kc_period)` of closes. This only fires when `kc_period`
//! is longer than the Bollinger period, i.e. short-term volatility has
//! contracted relative to the longer window.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::atr_values;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::stddev::{calculate_stddev, mean_and_stddev, window_ending_at};
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqueezeMode {
    Keltner,
    Stddev,
}

impl std::str::FromStr for SqueezeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keltner" => Ok(SqueezeMode::Keltner),
            "stddev" => Ok(SqueezeMode::Stddev),
            other => Err(format!("unknown squeeze mode '{other}', expected keltner or stddev")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SqueezeParams {
    pub mode: SqueezeMode,
    pub bb_period: usize,
    pub bb_mult_x100: u32,
    pub kc_period: usize,
    pub kc_mult_x100: u32,
}

pub fn calculate_squeeze(candles: &[Candle], params: &SqueezeParams) -> IndicatorSeries {
    let bollinger = calculate_bollinger(candles, params.bb_period, params.bb_mult_x100);

    let reference: Vec<Option<(f64, f64)>> = match params.mode {
        SqueezeMode::Keltner => keltner_channel(candles, params.kc_period, params.kc_mult_x100),
        SqueezeMode::Stddev => {
            let mult = params.kc_mult_x100 as f64 / 100.0;
            calculate_stddev(candles, params.kc_period)
                .values
                .iter()
                .map(|p| p.simple().map(|sd| (mult * sd, 0.0)))
                .collect()
        }
    };

    let values = bollinger
        .values
        .iter()
        .zip(reference)
        .map(|(bb, reference)| {
            let on = match (bb.valid, &bb.value, reference) {
                (true, IndicatorValue::Bollinger { upper, lower, .. }, Some(r)) => {
                    Some(match params.mode {
                        SqueezeMode::Keltner => {
                            let (kc_upper, kc_lower) = r;
                            *lower > kc_lower && *upper < kc_upper
                        }
                        SqueezeMode::Stddev => (upper - lower) < r.0,
                    })
                }
                _ => None,
            };
            IndicatorPoint {
                bucket_start: bb.bucket_start,
                valid: on.is_some(),
                value: IndicatorValue::Flag(on.unwrap_or(false)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Squeeze {
            bb_period: params.bb_period,
            kc_period: params.kc_period,
        },
        values,
    }
}

/// (upper, lower) Keltner channel per candle, `None` during warmup.
fn keltner_channel(candles: &[Candle], period: usize, mult_x100: u32) -> Vec<Option<(f64, f64)>> {
    let mult = mult_x100 as f64 / 100.0;
    let atr = atr_values(candles, period);
    (0..candles.len())
        .map(|i| {
            let window = window_ending_at(candles, i, period)?;
            let (mid, _) = mean_and_stddev(window);
            let atr = atr[i]?;
            Some((mid + mult * atr, mid - mult * atr))
        })
        .collect()
}
