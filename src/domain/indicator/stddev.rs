//! Rolling population standard deviation of closes.
//!
//! STDDEV(n)[i] = sqrt(sum((C[i-j] - SMA(n)[i])^2 for j in 0..n-1) / n)
//! Warmup: first (n-1) candles are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_stddev(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let window = window_ending_at(candles, i, period);
            IndicatorPoint {
                bucket_start: candle.bucket_start,
                valid: window.is_some(),
                value: IndicatorValue::Simple(window.map(|w| mean_and_stddev(w).1).unwrap_or(0.0)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Stddev(period),
        values,
    }
}

/// The `period` candles ending at `i`, if that many exist.
pub(crate) fn window_ending_at(candles: &[Candle], i: usize, period: usize) -> Option<&[Candle]> {
    if period == 0 || i + 1 < period {
        return None;
    }
    Some(&candles[i + 1 - period..=i])
}

/// (SMA, population stddev) of the window's closes.
pub(crate) fn mean_and_stddev(window: &[Candle]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().map(|c| c.close).sum::<f64>() / n;
    let variance = window
        .iter()
        .map(|c| {
            let diff = c.close - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}
