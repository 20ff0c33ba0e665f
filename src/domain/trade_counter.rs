//! Per-instrument daily trade counter.
//!
//! Keyed by `(instrument, trading_day)`, so a new day starts from zero
//! without a reset job. Entries are reserved before the order goes out and
//! released if the order fails.

use chrono::NaiveDate;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct DailyTradeCounter {
    counts: DashMap<(String, NaiveDate), u32>,
}

impl DailyTradeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, instrument: &str, day: NaiveDate) -> u32 {
        self.counts
            .get(&(instrument.to_string(), day))
            .map(|c| *c)
            .unwrap_or(0)
    }

    /// Takes one slot if fewer than `max` trades were taken that day.
    pub fn try_reserve(&self, instrument: &str, day: NaiveDate, max: u32) -> bool {
        let mut entry = self.counts.entry((instrument.to_string(), day)).or_insert(0);
        if *entry >= max {
            return false;
        }
        *entry += 1;
        true
    }

    /// Gives back a reservation made by [`try_reserve`](Self::try_reserve).
    pub fn release(&self, instrument: &str, day: NaiveDate) {
        if let Some(mut entry) = self.counts.get_mut(&(instrument.to_string(), day)) {
            *entry = entry.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn reserve_up_to_max() {
        let counter = DailyTradeCounter::new();
        assert!(counter.try_reserve("NIFTY", day(15), 2));
        assert!(counter.try_reserve("NIFTY", day(15), 2));
        assert!(!counter.try_reserve("NIFTY", day(15), 2));
        assert_eq!(counter.count("NIFTY", day(15)), 2);
    }

    #[test]
    fn instruments_and_days_are_independent() {
        let counter = DailyTradeCounter::new();
        assert!(counter.try_reserve("NIFTY", day(15), 1));
        assert!(counter.try_reserve("BANKNIFTY", day(15), 1));
        assert!(counter.try_reserve("NIFTY", day(16), 1));
        assert!(!counter.try_reserve("NIFTY", day(15), 1));
    }

    #[test]
    fn release_returns_slot() {
        let counter = DailyTradeCounter::new();
        assert!(counter.try_reserve("NIFTY", day(15), 1));
        counter.release("NIFTY", day(15));
        assert_eq!(counter.count("NIFTY", day(15)), 0);
        assert!(counter.try_reserve("NIFTY", day(15), 1));
    }

    #[test]
    fn release_without_reservation_is_harmless() {
        let counter = DailyTradeCounter::new();
        counter.release("NIFTY", day(15));
        assert_eq!(counter.count("NIFTY", day(15)), 0);
    }
}
