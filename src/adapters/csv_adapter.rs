//! CSV tick file adapter.
//!
//! Expects a header row and the columns `instrument,timestamp,price`.
//! Timestamps are RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC) or Unix
//! seconds.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::error::EngineError;
use crate::domain::tick::Tick;
use crate::ports::tick_source::TickSource;

#[derive(Debug, Deserialize)]
struct TickRecord {
    instrument: String,
    timestamp: String,
    price: f64,
}

pub struct CsvTickSource {
    path: PathBuf,
    instrument: Option<String>,
}

impl CsvTickSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            instrument: None,
        }
    }

    /// Keeps only ticks for `instrument`.
    pub fn for_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }
}

impl TickSource for CsvTickSource {
    fn load_ticks(&self) -> Result<Vec<Tick>, EngineError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| EngineError::TickData {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let mut ticks = Vec::new();
        for (row, result) in rdr.deserialize::<TickRecord>().enumerate() {
            let record = result.map_err(|e| EngineError::TickData {
                reason: format!("CSV parse error: {}", e),
            })?;
            if let Some(only) = &self.instrument {
                if &record.instrument != only {
                    continue;
                }
            }
            // header is line 1
            let timestamp = parse_timestamp(&record.timestamp).ok_or_else(|| {
                EngineError::TickData {
                    reason: format!(
                        "line {}: invalid timestamp '{}'",
                        row + 2,
                        record.timestamp
                    ),
                }
            })?;
            ticks.push(Tick::new(record.instrument, record.price, timestamp));
        }
        Ok(ticks)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}
