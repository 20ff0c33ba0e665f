//! Tick-to-candle aggregation.
//!
//! A [`CandleSeries`] owns the sealed history of one `(instrument, timeframe)`
//! key plus at most one unsealed candle. Sealed candles are write-once: late
//! ticks are dropped and reported, never applied.
//!
//! When ticks skip one or more buckets, the next tick simply opens its own
//! bucket. No empty candles are synthesized for the gap.
//!
//! The series keeps every sealed candle until [`CandleSeries::trim_to`] is
//! called. Long-running lanes trim after each seal so memory stays bounded.

use chrono::{DateTime, TimeZone, Utc};

use super::candle::{Candle, SeriesKey};
use super::tick::Tick;

/// Emitted once per candle when it is sealed.
#[derive(Debug, Clone, PartialEq)]
pub struct SealedCandleEvent {
    pub key: SeriesKey,
    /// Number of candles the series sealed before this one. Trimming the
    /// history does not shift it.
    pub index: usize,
    pub candle: Candle,
}

/// A tick that arrived for a bucket older than the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleTick {
    pub key: SeriesKey,
    pub tick_bucket: DateTime<Utc>,
    pub current_bucket: DateTime<Utc>,
    pub price: f64,
}

/// Outcome of feeding one tick to a series.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingest {
    /// The current candle absorbed the tick (or was created by it).
    Updated,
    /// The previous candle was sealed and the tick opened a new bucket.
    Sealed(SealedCandleEvent),
    /// The tick belonged to an earlier bucket and was dropped.
    Stale(StaleTick),
    /// The tick price was not a positive finite number.
    Rejected,
}

/// Floor `ts` to the start of its `timeframe_minutes` bucket, aligned to the epoch.
pub fn bucket_start(ts: DateTime<Utc>, timeframe_minutes: u32) -> DateTime<Utc> {
    let width = i64::from(timeframe_minutes.max(1)) * 60;
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(width);
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

#[derive(Debug, Clone)]
pub struct CandleSeries {
    key: SeriesKey,
    closed: Vec<Candle>,
    /// Sealed candles already trimmed from the front of `closed`.
    dropped: usize,
    current: Option<Candle>,
}

impl CandleSeries {
    pub fn new(key: SeriesKey) -> Self {
        CandleSeries {
            key,
            closed: Vec::new(),
            dropped: 0,
            current: None,
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Retained sealed candles, oldest first.
    pub fn closed(&self) -> &[Candle] {
        &self.closed
    }

    /// The last `n` retained sealed candles.
    pub fn recent(&self, n: usize) -> &[Candle] {
        &self.closed[self.closed.len().saturating_sub(n)..]
    }

    /// Every candle sealed so far, trimmed or not.
    pub fn sealed_count(&self) -> usize {
        self.dropped + self.closed.len()
    }

    /// Drops the oldest sealed candles down to `keep` once more than twice
    /// that many are held, so trimming costs amortized O(1) per seal.
    pub fn trim_to(&mut self, keep: usize) {
        let keep = keep.max(1);
        if self.closed.len() <= keep.saturating_mul(2) {
            return;
        }
        let excess = self.closed.len() - keep;
        self.closed.drain(..excess);
        self.dropped += excess;
    }

    pub fn current(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    pub fn ingest(&mut self, tick: &Tick) -> Ingest {
        if !tick.is_valid() {
            return Ingest::Rejected;
        }

        let bucket = bucket_start(tick.timestamp, self.key.timeframe_minutes);

        match self.current.as_mut() {
            None => {
                self.current = Some(Candle::open_at(bucket, tick.price));
                Ingest::Updated
            }
            Some(current) if bucket == current.bucket_start => {
                current.high = current.high.max(tick.price);
                current.low = current.low.min(tick.price);
                current.close = tick.price;
                Ingest::Updated
            }
            Some(current) if bucket < current.bucket_start => Ingest::Stale(StaleTick {
                key: self.key.clone(),
                tick_bucket: bucket,
                current_bucket: current.bucket_start,
                price: tick.price,
            }),
            Some(_) => {
                let next = Candle::open_at(bucket, tick.price);
                let sealed = self.seal_current(Some(next));
                match sealed {
                    Some(event) => Ingest::Sealed(event),
                    None => Ingest::Updated,
                }
            }
        }
    }

    /// Seals the current candle, if any, without opening a new one.
    pub fn flush(&mut self) -> Option<SealedCandleEvent> {
        self.seal_current(None)
    }

    fn seal_current(&mut self, next: Option<Candle>) -> Option<SealedCandleEvent> {
        let mut candle = std::mem::replace(&mut self.current, next)?;
        candle.sealed = true;
        self.closed.push(candle.clone());
        Some(SealedCandleEvent {
            key: self.key.clone(),
            index: self.sealed_count() - 1,
            candle,
        })
    }
}
