//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Warmup: first (period-1) candles are invalid.

use crate::domain::candle::Candle;
use crate::domain::indicator::stddev::{mean_and_stddev, window_ending_at};
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};

pub fn calculate_bollinger(
    candles: &[Candle],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let mult = stddev_mult_x100 as f64 / 100.0;

    let values = candles
        .iter()
        .enumerate()
        .map(|(i, candle)| {
            let window = window_ending_at(candles, i, period);
            let (upper, middle, lower) = match window {
                Some(w) => {
                    let (middle, stddev) = mean_and_stddev(w);
                    (middle + mult * stddev, middle, middle - mult * stddev)
                }
                None => (0.0, 0.0, 0.0),
            };
            IndicatorPoint {
                bucket_start: candle.bucket_start,
                valid: window.is_some(),
                value: IndicatorValue::Bollinger {
                    upper,
                    middle,
                    lower,
                },
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        },
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::flat_candles;

    fn bands(series: &IndicatorSeries, i: usize) -> (f64, f64, f64) {
        match series.values[i].value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => (upper, middle, lower),
            ref other => panic!("expected Bollinger value, got {other:?}"),
        }
    }

    #[test]
    fn bollinger_warmup() {
        let series = calculate_bollinger(&flat_candles(&[10.0, 20.0, 30.0, 40.0, 50.0]), 3, 200);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn bollinger_constant_values() {
        let series = calculate_bollinger(&flat_candles(&[100.0; 5]), 3, 200);
        let (upper, middle, lower) = bands(&series, 2);
        assert!((middle - 100.0).abs() < f64::EPSILON);
        assert!((upper - 100.0).abs() < f64::EPSILON);
        assert!((lower - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_basic_calculation() {
        let series = calculate_bollinger(&flat_candles(&[10.0, 20.0, 30.0]), 3, 200);
        let (upper, middle, lower) = bands(&series, 2);

        let variance: f64 = (100.0 + 0.0 + 100.0) / 3.0;
        let stddev = variance.sqrt();
        assert!((middle - 20.0).abs() < 1e-10);
        assert!((upper - (20.0 + 2.0 * stddev)).abs() < 1e-10);
        assert!((lower - (20.0 - 2.0 * stddev)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_symmetry() {
        let series = calculate_bollinger(&flat_candles(&[10.0, 25.0, 30.0]), 3, 150);
        let (upper, middle, lower) = bands(&series, 2);
        assert!(((upper - middle) - (middle - lower)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_indicator_type() {
        let series = calculate_bollinger(&flat_candles(&[10.0]), 20, 200);
        assert_eq!(
            series.indicator_type,
            IndicatorType::Bollinger {
                period: 20,
                stddev_mult_x100: 200
            }
        );
    }
}
