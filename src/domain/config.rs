//! Engine configuration and its validation.
//!
//! Everything is read through [`ConfigPort`] and checked once at startup.
//! The `[risk]` section is mandatory; other sections fall back to defaults.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use std::time::Duration;

use crate::domain::error::EngineError;
use crate::domain::indicator::snapshot::IndicatorConfig;
use crate::domain::indicator::squeeze::SqueezeMode;
use crate::domain::signal::SignalRules;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct RiskConfig {
    pub tp_pct: f64,
    pub sl_pct: f64,
    /// Zero disables the trailing stop.
    pub trail_pct: f64,
    pub max_trades_per_day: u32,
    /// Exchange-local time after which positions are squared off and no
    /// new entries are taken.
    pub squareoff_time: NaiveTime,
    pub max_open_positions: usize,
    pub per_trade_capital: f64,
    pub allow_shorting: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        RiskConfig {
            tp_pct: 0.05,
            sl_pct: 0.02,
            trail_pct: 0.01,
            max_trades_per_day: 3,
            squareoff_time: NaiveTime::from_hms_opt(15, 15, 0).unwrap_or_default(),
            max_open_positions: 10,
            per_trade_capital: 20_000.0,
            allow_shorting: true,
        }
    }
}

impl RiskConfig {
    /// Whole units affordable at `price`; zero means the entry is skipped.
    pub fn quantity_for(&self, price: f64) -> u64 {
        if price <= 0.0 || !price.is_finite() {
            return 0;
        }
        (self.per_trade_capital / price).floor().max(0.0) as u64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Exchange offset from UTC, validated to lie within a day.
    pub utc_offset_minutes: i32,
    /// Candle widths in minutes, one lane per instrument and timeframe.
    pub timeframes: Vec<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            utc_offset_minutes: 330,
            timeframes: vec![5],
        }
    }
}

impl SessionConfig {
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    /// Exchange-local calendar day of `ts`, the key of the daily trade counter.
    pub fn trading_day(&self, ts: DateTime<Utc>) -> NaiveDate {
        ts.with_timezone(&self.utc_offset()).date_naive()
    }

    pub fn local_time(&self, ts: DateTime<Utc>) -> NaiveTime {
        ts.with_timezone(&self.utc_offset()).time()
    }

    pub fn is_past_squareoff(&self, ts: DateTime<Utc>, squareoff: NaiveTime) -> bool {
        self.local_time(ts) >= squareoff
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub timeout: Duration,
    pub status_poll_attempts: u32,
    pub close_max_attempts: u32,
    pub backoff: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            timeout: Duration::from_millis(2000),
            status_poll_attempts: 3,
            close_max_attempts: 5,
            backoff: Duration::from_millis(200),
        }
    }
}

impl GatewayConfig {
    /// Delay before retry number `attempt` (0-based): `backoff * 2^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(10))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSizing {
    pub lane_capacity: usize,
    pub event_capacity: usize,
    /// Sealed candles kept per lane, as a multiple of the indicator lookback.
    pub history_factor: usize,
}

impl Default for EngineSizing {
    fn default() -> Self {
        EngineSizing {
            lane_capacity: 1024,
            event_capacity: 4096,
            history_factor: 8,
        }
    }
}

/// Every INI section [`EngineConfig::from_port`] reads.
pub const KNOWN_SECTIONS: &[&str] = &["risk", "session", "indicators", "signal", "gateway", "engine"];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    pub risk: RiskConfig,
    pub session: SessionConfig,
    pub indicators: IndicatorConfig,
    pub signal: SignalRules,
    pub gateway: GatewayConfig,
    pub sizing: EngineSizing,
}

impl EngineConfig {
    pub fn from_port(config: &dyn ConfigPort) -> Result<Self, EngineError> {
        Ok(EngineConfig {
            risk: build_risk_config(config)?,
            session: build_session_config(config)?,
            indicators: build_indicator_config(config)?,
            signal: build_signal_rules(config)?,
            gateway: build_gateway_config(config)?,
            sizing: build_engine_sizing(config)?,
        })
    }

    /// Number of trailing sealed candles the indicators are evaluated on.
    pub fn history_window(&self) -> usize {
        self.indicators
            .required_lookback()
            .max(1)
            .saturating_mul(self.sizing.history_factor.max(1))
    }
}

pub fn build_risk_config(config: &dyn ConfigPort) -> Result<RiskConfig, EngineError> {
    let tp_pct = required_f64(config, "risk", "tp_pct")?;
    let sl_pct = required_f64(config, "risk", "sl_pct")?;
    let trail_pct = required_f64(config, "risk", "trail_pct")?;
    let max_trades = required_f64(config, "risk", "max_trades_per_day")?;
    let squareoff = required_string(config, "risk", "squareoff_time")?;

    validate_fraction("risk", "tp_pct", tp_pct, false)?;
    validate_fraction("risk", "sl_pct", sl_pct, false)?;
    validate_fraction("risk", "trail_pct", trail_pct, true)?;
    if max_trades < 1.0 || max_trades.fract() != 0.0 {
        return Err(EngineError::invalid(
            "risk",
            "max_trades_per_day",
            "max_trades_per_day must be a whole number of at least 1",
        ));
    }

    let squareoff_time = NaiveTime::parse_from_str(squareoff.trim(), "%H:%M").map_err(|_| {
        EngineError::invalid("risk", "squareoff_time", "invalid time format, expected HH:MM")
    })?;

    let max_open_positions = config.get_int("risk", "max_open_positions", 10);
    if max_open_positions < 1 {
        return Err(EngineError::invalid(
            "risk",
            "max_open_positions",
            "max_open_positions must be at least 1",
        ));
    }

    let per_trade_capital = config.get_double("risk", "per_trade_capital", 20_000.0);
    if per_trade_capital <= 0.0 {
        return Err(EngineError::invalid(
            "risk",
            "per_trade_capital",
            "per_trade_capital must be positive",
        ));
    }

    Ok(RiskConfig {
        tp_pct,
        sl_pct,
        trail_pct,
        max_trades_per_day: max_trades as u32,
        squareoff_time,
        max_open_positions: max_open_positions as usize,
        per_trade_capital,
        allow_shorting: config.get_bool("risk", "allow_shorting", true),
    })
}

pub fn build_session_config(config: &dyn ConfigPort) -> Result<SessionConfig, EngineError> {
    let offset_minutes = config.get_int("session", "utc_offset_minutes", 330);
    if offset_minutes.abs() >= 24 * 60 {
        return Err(EngineError::invalid(
            "session",
            "utc_offset_minutes",
            "utc_offset_minutes must be within +/- 24 hours",
        ));
    }

    let raw = config
        .get_string("session", "timeframes")
        .unwrap_or_else(|| "5".to_string());
    let timeframes = parse_timeframes(&raw)?;

    Ok(SessionConfig {
        utc_offset_minutes: offset_minutes as i32,
        timeframes,
    })
}

/// Parses a comma-separated list of minute widths, sorted and deduplicated.
pub fn parse_timeframes(raw: &str) -> Result<Vec<u32>, EngineError> {
    let mut timeframes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.parse::<u32>() {
            Ok(minutes) if minutes > 0 => timeframes.push(minutes),
            _ => {
                return Err(EngineError::invalid(
                    "session",
                    "timeframes",
                    format!("'{part}' is not a positive number of minutes"),
                ));
            }
        }
    }
    if timeframes.is_empty() {
        return Err(EngineError::invalid(
            "session",
            "timeframes",
            "at least one timeframe is required",
        ));
    }
    timeframes.sort_unstable();
    timeframes.dedup();
    Ok(timeframes)
}

pub fn build_indicator_config(config: &dyn ConfigPort) -> Result<IndicatorConfig, EngineError> {
    let defaults = IndicatorConfig::default();
    let period = |key: &str, default: usize| -> Result<usize, EngineError> {
        let value = config.get_int("indicators", key, default as i64);
        if value < 1 {
            return Err(EngineError::invalid(
                "indicators",
                key,
                format!("{key} must be at least 1"),
            ));
        }
        Ok(value as usize)
    };
    let multiplier = |key: &str, default: f64| -> Result<f64, EngineError> {
        let value = config.get_double("indicators", key, default);
        if value <= 0.0 || !value.is_finite() {
            return Err(EngineError::invalid(
                "indicators",
                key,
                format!("{key} must be positive"),
            ));
        }
        Ok(value)
    };

    let macd_fast = period("macd_fast", defaults.macd_fast)?;
    let macd_slow = period("macd_slow", defaults.macd_slow)?;
    if macd_fast >= macd_slow {
        return Err(EngineError::invalid(
            "indicators",
            "macd_fast",
            "macd_fast must be less than macd_slow",
        ));
    }

    let squeeze_mode = match config.get_string("indicators", "squeeze_mode") {
        None => defaults.squeeze_mode,
        Some(raw) => raw.parse::<SqueezeMode>().map_err(|reason| {
            EngineError::invalid("indicators", "squeeze_mode", reason)
        })?,
    };

    Ok(IndicatorConfig {
        min_lookback: period("min_lookback", defaults.min_lookback)?,
        rsi_period: period("rsi_period", defaults.rsi_period)?,
        atr_period: period("atr_period", defaults.atr_period)?,
        supertrend_multiplier: multiplier("supertrend_multiplier", defaults.supertrend_multiplier)?,
        bb_period: period("bb_period", defaults.bb_period)?,
        bb_multiplier: multiplier("bb_multiplier", defaults.bb_multiplier)?,
        macd_fast,
        macd_slow,
        macd_signal: period("macd_signal", defaults.macd_signal)?,
        keltner_period: period("keltner_period", defaults.keltner_period)?,
        keltner_multiplier: multiplier("keltner_multiplier", defaults.keltner_multiplier)?,
        squeeze_mode,
    })
}

pub fn build_signal_rules(config: &dyn ConfigPort) -> Result<SignalRules, EngineError> {
    let defaults = SignalRules::default();
    let buy = config.get_double("signal", "rsi_buy_threshold", defaults.rsi_buy_threshold);
    let sell = config.get_double("signal", "rsi_sell_threshold", defaults.rsi_sell_threshold);
    for (key, value) in [("rsi_buy_threshold", buy), ("rsi_sell_threshold", sell)] {
        if !(0.0..=100.0).contains(&value) {
            return Err(EngineError::invalid(
                "signal",
                key,
                format!("{key} must be between 0 and 100"),
            ));
        }
    }
    if buy <= sell {
        return Err(EngineError::invalid(
            "signal",
            "rsi_buy_threshold",
            "rsi_buy_threshold must be greater than rsi_sell_threshold",
        ));
    }
    Ok(SignalRules {
        rsi_buy_threshold: buy,
        rsi_sell_threshold: sell,
    })
}

pub fn build_gateway_config(config: &dyn ConfigPort) -> Result<GatewayConfig, EngineError> {
    let count = |key: &str, default: i64| -> Result<u64, EngineError> {
        let value = config.get_int("gateway", key, default);
        if value < 1 {
            return Err(EngineError::invalid(
                "gateway",
                key,
                format!("{key} must be at least 1"),
            ));
        }
        Ok(value as u64)
    };
    let backoff_ms = config.get_int("gateway", "backoff_ms", 200);
    if backoff_ms < 0 {
        return Err(EngineError::invalid(
            "gateway",
            "backoff_ms",
            "backoff_ms must be non-negative",
        ));
    }
    Ok(GatewayConfig {
        timeout: Duration::from_millis(count("timeout_ms", 2000)?),
        status_poll_attempts: count("status_poll_attempts", 3)? as u32,
        close_max_attempts: count("close_max_attempts", 5)? as u32,
        backoff: Duration::from_millis(backoff_ms as u64),
    })
}

pub fn build_engine_sizing(config: &dyn ConfigPort) -> Result<EngineSizing, EngineError> {
    let capacity = |key: &str, default: i64| -> Result<usize, EngineError> {
        let value = config.get_int("engine", key, default);
        if value < 1 {
            return Err(EngineError::invalid(
                "engine",
                key,
                format!("{key} must be at least 1"),
            ));
        }
        Ok(value as usize)
    };
    Ok(EngineSizing {
        lane_capacity: capacity("lane_capacity", 1024)?,
        event_capacity: capacity("event_capacity", 4096)?,
        history_factor: capacity("history_factor", 8)?,
    })
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, EngineError> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| EngineError::missing(section, key))
}

fn required_f64(config: &dyn ConfigPort, section: &str, key: &str) -> Result<f64, EngineError> {
    let raw = required_string(config, section, key)?;
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EngineError::invalid(section, key, format!("'{raw}' is not a number")))
}

fn validate_fraction(section: &str, key: &str, value: f64, allow_zero: bool) -> Result<(), EngineError> {
    let low_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if !low_ok || value >= 1.0 {
        let lower = if allow_zero { "[0" } else { "(0" };
        return Err(EngineError::invalid(
            section,
            key,
            format!("{key} must be in {lower}, 1)"),
        ));
    }
    Ok(())
}
