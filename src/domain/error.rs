//! Domain error types.
//!
//! Recoverable conditions that are part of normal operation (stale ticks,
//! indicator warmup, validator conflicts) are reported as values on the event
//! bus, not as errors. This module covers what actually fails.

/// Errors reported by an order gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway failure: {reason}")]
    Failure { reason: String },

    #[error("gateway call timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("unknown order {order_ref}")]
    UnknownOrder { order_ref: String },
}

/// Top-level error type for lanetrader.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("tick data error: {reason}")]
    TickData { reason: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("lane for {instrument} ({timeframe}m) is no longer running")]
    LaneClosed { instrument: String, timeframe: u32 },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn missing(section: &str, key: &str) -> Self {
        EngineError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        EngineError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&EngineError> for std::process::ExitCode {
    fn from(err: &EngineError) -> Self {
        let code: u8 = match err {
            EngineError::Io(_) => 1,
            EngineError::ConfigParse { .. }
            | EngineError::ConfigMissing { .. }
            | EngineError::ConfigInvalid { .. } => 2,
            EngineError::TickData { .. } | EngineError::Csv(_) => 3,
            EngineError::Gateway(_) => 4,
            EngineError::LaneClosed { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_formats_section_and_key() {
        let err = EngineError::missing("risk", "tp_pct");
        assert_eq!(err.to_string(), "missing config key [risk] tp_pct");
    }

    #[test]
    fn gateway_error_wraps_transparently() {
        let err: EngineError = GatewayError::Timeout { timeout_ms: 250 }.into();
        assert_eq!(err.to_string(), "gateway call timed out after 250 ms");
    }

    #[test]
    fn invalid_carries_reason() {
        let err = EngineError::invalid("risk", "sl_pct", "must be between 0 and 1");
        assert_eq!(
            err.to_string(),
            "invalid config value [risk] sl_pct: must be between 0 and 1"
        );
    }
}
