//! Technical indicators computed over sealed candles.
//!
//! Every `calculate_*` function is pure: it takes the closed-candle history and
//! returns one [`IndicatorPoint`] per candle, with `valid == false` during the
//! indicator's warmup. [`snapshot::compute`] combines them into the
//! [`snapshot::IndicatorSnapshot`] consumed by the signal validator.
//!
//! - `IndicatorPoint`: a single point in an indicator time series
//! - `IndicatorValue`: enum for the different indicator output shapes
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a time series of indicator values

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod snapshot;
pub mod squeeze;
pub mod stddev;
pub mod supertrend;

pub use ema::calculate_ema;
pub use supertrend::Trend;

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub bucket_start: DateTime<Utc>,
    pub valid: bool,
    pub value: IndicatorValue,
}

impl IndicatorPoint {
    /// The scalar value of a valid `Simple` point.
    pub fn simple(&self) -> Option<f64> {
        match self.value {
            IndicatorValue::Simple(v) if self.valid => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Flag(bool),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
    Supertrend {
        line: f64,
        trend: Trend,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Stddev(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Supertrend {
        period: usize,
        multiplier_x100: u32,
    },
    Squeeze {
        bb_period: usize,
        kc_period: usize,
    },
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// The point computed for the most recent candle, if it is past warmup.
    pub fn last_valid(&self) -> Option<&IndicatorPoint> {
        self.values.last().filter(|p| p.valid)
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Supertrend {
                period,
                multiplier_x100,
            } => {
                let mult = *multiplier_x100 as f64 / 100.0;
                write!(f, "SUPERTREND({},{})", period, mult)
            }
            IndicatorType::Squeeze {
                bb_period,
                kc_period,
            } => write!(f, "SQUEEZE({},{})", bb_period, kc_period),
        }
    }
}

/// Convert a float multiplier to the hundredths used in [`IndicatorType`].
pub fn mult_x100(mult: f64) -> u32 {
    (mult * 100.0).round().max(0.0) as u32
}

#[cfg(test)]
pub(crate) fn flat_candles(closes: &[f64]) -> Vec<crate::domain::candle::Candle> {
    use chrono::{Duration, TimeZone};

    let start = Utc.with_ymd_and_hms(2024, 1, 15, 9, 15, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| crate::domain::candle::Candle {
            bucket_start: start + Duration::minutes(5 * i as i64),
            open: close,
            high: close,
            low: close,
            close,
            sealed: true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_type_display_macd() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn indicator_type_display_supertrend() {
        let st = IndicatorType::Supertrend {
            period: 10,
            multiplier_x100: 300,
        };
        assert_eq!(st.to_string(), "SUPERTREND(10,3)");
    }

    #[test]
    fn mult_x100_rounds() {
        assert_eq!(mult_x100(2.0), 200);
        assert_eq!(mult_x100(1.5), 150);
        assert_eq!(mult_x100(0.333), 33);
    }

    #[test]
    fn simple_requires_valid() {
        let bucket_start = chrono::Utc::now();
        let warm = IndicatorPoint {
            bucket_start,
            valid: false,
            value: IndicatorValue::Simple(1.0),
        };
        assert_eq!(warm.simple(), None);
        let ready = IndicatorPoint {
            valid: true,
            ..warm
        };
        assert_eq!(ready.simple(), Some(1.0));
    }
}
