//! OHLC candle representation.

use chrono::{DateTime, Utc};
use std::fmt;

/// Identifies one candle series: an instrument at a fixed timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub instrument: String,
    pub timeframe_minutes: u32,
}

impl SeriesKey {
    pub fn new(instrument: impl Into<String>, timeframe_minutes: u32) -> Self {
        SeriesKey {
            instrument: instrument.into(),
            timeframe_minutes,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}m", self.instrument, self.timeframe_minutes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub bucket_start: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub sealed: bool,
}

impl Candle {
    /// Starts an unsealed candle from its first tick.
    pub fn open_at(bucket_start: DateTime<Utc>, price: f64) -> Self {
        Candle {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            sealed: false,
        }
    }

    /// (high + low) / 2
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}
