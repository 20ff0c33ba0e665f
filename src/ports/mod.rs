//! Port traits (hexagonal architecture boundaries).

pub mod clock;
pub mod config_port;
pub mod journal_port;
pub mod order_gateway;
pub mod tick_source;
