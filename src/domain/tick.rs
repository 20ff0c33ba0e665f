//! Price tick representation.

use chrono::{DateTime, Utc};

/// A single last-traded-price update for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub instrument: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Tick {
    pub fn new(instrument: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Tick {
            instrument: instrument.into(),
            price,
            timestamp,
        }
    }

    /// Ticks with non-finite or non-positive prices are never aggregated.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn validity() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 9, 15, 0).unwrap();
        assert!(Tick::new("NIFTY", 21500.5, ts).is_valid());
        assert!(!Tick::new("NIFTY", 0.0, ts).is_valid());
        assert!(!Tick::new("NIFTY", -3.0, ts).is_valid());
        assert!(!Tick::new("NIFTY", f64::NAN, ts).is_valid());
    }
}
