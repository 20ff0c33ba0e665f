//! CSV trade journal writer.

use serde::Serialize;
use std::path::PathBuf;

use crate::domain::error::EngineError;
use crate::domain::position::ClosedTrade;
use crate::ports::journal_port::JournalPort;

#[derive(Debug, Serialize)]
struct JournalRow<'a> {
    instrument: &'a str,
    timeframe: u32,
    side: String,
    qty: u64,
    entry_price: f64,
    exit_price: f64,
    opened_at: String,
    closed_at: String,
    pnl: f64,
    exit_reason: String,
    order_ref: &'a str,
}

impl<'a> From<&'a ClosedTrade> for JournalRow<'a> {
    fn from(trade: &'a ClosedTrade) -> Self {
        JournalRow {
            instrument: &trade.instrument,
            timeframe: trade.timeframe,
            side: trade.side.to_string(),
            qty: trade.qty,
            entry_price: trade.entry_price,
            exit_price: trade.exit_price,
            opened_at: trade.opened_at.to_rfc3339(),
            closed_at: trade.closed_at.to_rfc3339(),
            pnl: (trade.pnl * 100.0).round() / 100.0,
            exit_reason: trade.exit_reason.to_string(),
            order_ref: &trade.order_ref,
        }
    }
}

pub struct CsvJournal {
    path: PathBuf,
}

impl CsvJournal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl JournalPort for CsvJournal {
    fn write_trades(&self, trades: &[ClosedTrade]) -> Result<(), EngineError> {
        let mut writer = csv::Writer::from_path(&self.path)?;
        for trade in trades {
            writer.serialize(JournalRow::from(trade))?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ExitReason;
    use crate::domain::signal::Side;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn trade() -> ClosedTrade {
        ClosedTrade {
            instrument: "NIFTY".into(),
            timeframe: 5,
            side: Side::Buy,
            qty: 10,
            entry_price: 100.0,
            exit_price: 105.0,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 15, 4, 0, 0).unwrap(),
            closed_at: Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 0).unwrap(),
            pnl: 50.0,
            exit_reason: ExitReason::TakeProfit,
            order_ref: "LT-NIFTY-000001".into(),
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.csv");
        CsvJournal::new(path.clone())
            .write_trades(&[trade()])
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "instrument,timeframe,side,qty,entry_price,exit_price,opened_at,closed_at,pnl,exit_reason,order_ref"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("NIFTY,5,BUY,10,100.0,105.0,"));
        assert!(row.ends_with(",50.0,take_profit,LT-NIFTY-000001"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn empty_journal_has_no_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.csv");
        CsvJournal::new(path.clone()).write_trades(&[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().count() <= 1);
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let journal = CsvJournal::new(PathBuf::from("/nonexistent/dir/journal.csv"));
        assert!(journal.write_trades(&[trade()]).is_err());
    }
}
