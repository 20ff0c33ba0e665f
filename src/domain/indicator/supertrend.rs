//! Supertrend: a trailing ATR band that follows the prevailing direction.
//!
//! Bands are `hl2 ± multiplier × ATR(period)`. The first valid candle starts
//! in a downtrend on the upper band. Afterwards:
//! - close above the previous line flips to Up, close below flips to Down,
//!   an exact touch keeps the previous direction;
//! - within an uptrend the line is `max(lower_band, prev_line)`, within a
//!   downtrend `min(upper_band, prev_line)`;
//! - on a flip the line restarts from the band of the new side.
//!
//! Warmup matches ATR: first (period-1) candles are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::atr_values;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trend {
    Up,
    Down,
}

pub fn calculate_supertrend(
    candles: &[Candle],
    period: usize,
    multiplier_x100: u32,
) -> IndicatorSeries {
    let multiplier = multiplier_x100 as f64 / 100.0;
    let atr = atr_values(candles, period);

    let mut values = Vec::with_capacity(candles.len());
    let mut prev: Option<(f64, Trend)> = None;

    for (candle, atr) in candles.iter().zip(atr) {
        let Some(atr) = atr else {
            values.push(IndicatorPoint {
                bucket_start: candle.bucket_start,
                valid: false,
                value: IndicatorValue::Supertrend {
                    line: 0.0,
                    trend: Trend::Down,
                },
            });
            continue;
        };

        let upper = candle.hl2() + multiplier * atr;
        let lower = candle.hl2() - multiplier * atr;

        let (line, trend) = match prev {
            None => (upper, Trend::Down),
            Some((prev_line, prev_trend)) => {
                let trend = if candle.close > prev_line {
                    Trend::Up
                } else if candle.close < prev_line {
                    Trend::Down
                } else {
                    prev_trend
                };
                let line = match (trend, trend == prev_trend) {
                    (Trend::Up, true) => lower.max(prev_line),
                    (Trend::Down, true) => upper.min(prev_line),
                    (Trend::Up, false) => lower,
                    (Trend::Down, false) => upper,
                };
                (line, trend)
            }
        };

        prev = Some((line, trend));
        values.push(IndicatorPoint {
            bucket_start: candle.bucket_start,
            valid: true,
            value: IndicatorValue::Supertrend { line, trend },
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Supertrend {
            period,
            multiplier_x100,
        },
        values,
    }
}
