//! Core domain types and logic: ticks, candles, indicators, signals and
//! positions. Nothing here does I/O or spawns tasks.

pub mod aggregator;
pub mod candle;
pub mod config;
pub mod error;
pub mod indicator;
pub mod position;
pub mod signal;
pub mod tick;
pub mod trade_counter;
