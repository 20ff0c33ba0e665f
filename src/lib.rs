//! lanetrader: intraday signal and position engine.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`]. The async runtime that wires them
//! together (one lane per instrument and timeframe) lives in [`engine`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod logging;
pub mod ports;
