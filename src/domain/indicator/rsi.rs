//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n, i.e. alpha = 1/n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! Warmup: first n candles are invalid (need n price changes to seed).

use crate::domain::candle::Candle;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_rsi(candles: &[Candle], period: usize) -> IndicatorSeries {
    let mut values: Vec<IndicatorPoint> = candles
        .iter()
        .map(|c| IndicatorPoint {
            bucket_start: c.bucket_start,
            valid: false,
            value: IndicatorValue::Simple(0.0),
        })
        .collect();

    if period == 0 || candles.len() <= period {
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values,
        };
    }

    let changes: Vec<f64> = candles.windows(2).map(|w| w[1].close - w[0].close).collect();
    let gain = |c: f64| if c > 0.0 { c } else { 0.0 };
    let loss = |c: f64| if c < 0.0 { -c } else { 0.0 };

    let mut avg_gain = changes[..period].iter().map(|&c| gain(c)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|&c| loss(c)).sum::<f64>() / period as f64;
    values[period].valid = true;
    values[period].value = IndicatorValue::Simple(rsi_from(avg_gain, avg_loss));

    let n = period as f64;
    for i in (period + 1)..candles.len() {
        let change = changes[i - 1];
        avg_gain = (avg_gain * (n - 1.0) + gain(change)) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss(change)) / n;
        values[i].valid = true;
        values[i].value = IndicatorValue::Simple(rsi_from(avg_gain, avg_loss));
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::flat_candles;

    #[test]
    fn rsi_empty_and_single() {
        assert!(calculate_rsi(&[], 14).values.is_empty());
        let series = calculate_rsi(&flat_candles(&[100.0]), 14);
        assert_eq!(series.values.len(), 1);
        assert!(!series.values[0].valid);
    }

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&flat_candles(&closes), 14);

        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "candle {} should be invalid", i);
        }
        assert!(series.values[14].valid, "candle 14 should be valid");
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&flat_candles(&closes), 14);
        let rsi = series.values[14].simple().unwrap();
        assert!((rsi - 100.0).abs() < f64::EPSILON, "RSI should be 100 when all gains");
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&flat_candles(&closes), 14);
        let rsi = series.values[14].simple().unwrap();
        assert!(rsi.abs() < f64::EPSILON, "RSI should be 0 when all losses");
    }

    #[test]
    fn rsi_mostly_gains_approaches_but_never_exceeds_100() {
        let mut closes: Vec<f64> = vec![100.0, 99.0];
        closes.extend((0..60).map(|i| 100.0 + i as f64));
        let series = calculate_rsi(&flat_candles(&closes), 14);

        let mut prev = 0.0;
        for point in series.values.iter().filter(|p| p.valid).skip(1) {
            let rsi = point.simple().unwrap();
            assert!(rsi <= 100.0);
            assert!(rsi >= prev);
            prev = rsi;
        }
        assert!(prev > 99.0);
    }

    #[test]
    fn rsi_in_range() {
        let closes: Vec<f64> = (1..=40)
            .map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0)
            .collect();
        let series = calculate_rsi(&flat_candles(&closes), 14);
        for rsi in series.values.iter().filter_map(|p| p.simple()) {
            assert!((0.0..=100.0).contains(&rsi), "RSI {} out of range", rsi);
        }
    }

    #[test]
    fn rsi_wilder_step() {
        // period 2: changes +2, -1, +3
        let series = calculate_rsi(&flat_candles(&[10.0, 12.0, 11.0, 14.0]), 2);
        // seed: gain 1.0, loss 0.5 → RSI = 100 - 100/3
        let seed = series.values[2].simple().unwrap();
        assert!((seed - (100.0 - 100.0 / 3.0)).abs() < 1e-9);
        // next: gain (1*1+3)/2 = 2, loss (0.5*1+0)/2 = 0.25 → rs 8
        let next = series.values[3].simple().unwrap();
        assert!((next - (100.0 - 100.0 / 9.0)).abs() < 1e-9);
    }

    #[test]
    fn rsi_zero_period() {
        let series = calculate_rsi(&flat_candles(&[100.0, 101.0]), 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
