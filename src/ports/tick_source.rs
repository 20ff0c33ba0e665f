//! Tick source port trait.

use crate::domain::error::EngineError;
use crate::domain::tick::Tick;

pub trait TickSource {
    /// All ticks, in the order the source delivered them. Out-of-order ticks
    /// are passed through as-is; the aggregator drops the late ones.
    fn load_ticks(&self) -> Result<Vec<Tick>, EngineError>;
}
