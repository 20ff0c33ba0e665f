//! Concrete port implementations.

pub mod csv_adapter;
pub mod csv_journal;
pub mod file_config_adapter;
pub mod paper_gateway;
pub mod system_clock;
