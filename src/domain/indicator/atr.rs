//! Average True Range with Wilder's smoothing.
//!
//! TR[0] = high - low, TR[i] = max(h-l, |h-pc|, |l-pc|).
//! Seed is the mean of the first n TRs, then ATR = (prev*(n-1) + TR)/n.
//! Warmup: first (n-1) candles are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_atr(candles: &[Candle], period: usize) -> IndicatorSeries {
    let values = atr_values(candles, period)
        .into_iter()
        .zip(candles)
        .map(|(atr, candle)| IndicatorPoint {
            bucket_start: candle.bucket_start,
            valid: atr.is_some(),
            value: IndicatorValue::Simple(atr.unwrap_or(0.0)),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

/// Raw ATR per candle, `None` during warmup.
pub(crate) fn atr_values(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period {
        return out;
    }

    let tr: Vec<f64> = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                c.true_range(candles[i - 1].close)
            }
        })
        .collect();

    let n = period as f64;
    let mut atr = tr[..period].iter().sum::<f64>() / n;
    out[period - 1] = Some(atr);
    for i in period..candles.len() {
        atr = (atr * (n - 1.0) + tr[i]) / n;
        out[i] = Some(atr);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_candles(hlc: &[(f64, f64, f64)]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 9, 15, 0).unwrap();
        hlc.iter()
            .enumerate()
            .map(|(i, &(high, low, close))| Candle {
                bucket_start: start + Duration::minutes(i as i64),
                open: close,
                high,
                low,
                close,
                sealed: true,
            })
            .collect()
    }

    #[test]
    fn atr_warmup() {
        let candles = make_candles(&[(110.0, 90.0, 100.0); 5]);
        let series = calculate_atr(&candles, 3);
        assert_eq!(series.values.len(), 5);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn atr_seed_is_average() {
        let candles = make_candles(&[
            (110.0, 100.0, 105.0),
            (115.0, 105.0, 110.0),
            (120.0, 110.0, 115.0),
        ]);
        let seed = calculate_atr(&candles, 3).values[2].simple().unwrap();
        assert!((seed - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let candles = make_candles(&[
            (110.0, 100.0, 105.0),
            (115.0, 105.0, 110.0),
            (120.0, 110.0, 115.0),
            (125.0, 115.0, 120.0),
        ]);
        let atr3 = calculate_atr(&candles, 3).values[3].simple().unwrap();
        let expected = (10.0 * 2.0 + 10.0) / 3.0;
        assert!((atr3 - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_uses_previous_close_on_gaps() {
        let candles = make_candles(&[(110.0, 100.0, 105.0), (130.0, 120.0, 125.0)]);
        // TR[1] = max(10, |130-105|, |120-105|) = 25, seed (10 + 25) / 2
        let atr = calculate_atr(&candles, 2).values[1].simple().unwrap();
        assert!((atr - 17.5).abs() < 1e-9);
    }

    #[test]
    fn atr_insufficient_candles() {
        let candles = make_candles(&[(110.0, 90.0, 100.0); 2]);
        let series = calculate_atr(&candles, 5);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
