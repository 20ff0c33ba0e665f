//! Trade journal port trait.

use crate::domain::error::EngineError;
use crate::domain::position::ClosedTrade;

/// Port for persisting closed trades.
pub trait JournalPort {
    fn write_trades(&self, trades: &[ClosedTrade]) -> Result<(), EngineError>;
}
