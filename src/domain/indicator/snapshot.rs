//! Indicator snapshot over a closed-candle history.
//!
//! [`compute`] evaluates every indicator on the full sealed history and keeps
//! the values at the last candle. It never sees the unsealed candle, so a
//! snapshot for candle `i` depends only on candles `0..=i`.

use crate::domain::candle::Candle;
use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::macd::calculate_macd;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::squeeze::{calculate_squeeze, SqueezeMode, SqueezeParams};
use crate::domain::indicator::supertrend::{calculate_supertrend, Trend};
use crate::domain::indicator::{mult_x100, IndicatorType, IndicatorValue};

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub min_lookback: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub supertrend_multiplier: f64,
    pub bb_period: usize,
    pub bb_multiplier: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub keltner_period: usize,
    pub keltner_multiplier: f64,
    pub squeeze_mode: SqueezeMode,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            min_lookback: 50,
            rsi_period: 14,
            atr_period: 10,
            supertrend_multiplier: 3.0,
            bb_period: 20,
            bb_multiplier: 2.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            keltner_period: 20,
            keltner_multiplier: 1.5,
            squeeze_mode: SqueezeMode::Keltner,
        }
    }
}

impl IndicatorConfig {
    /// Closed candles needed before every indicator is past its warmup.
    pub fn required_lookback(&self) -> usize {
        [
            self.min_lookback,
            self.rsi_period + 1,
            self.atr_period,
            self.bb_period,
            self.macd_slow + self.macd_signal - 1,
            self.keltner_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Every indicator the snapshot evaluates, with its parameters.
    pub fn indicator_types(&self) -> Vec<IndicatorType> {
        vec![
            IndicatorType::Rsi(self.rsi_period),
            IndicatorType::Atr(self.atr_period),
            IndicatorType::Supertrend {
                period: self.atr_period,
                multiplier_x100: mult_x100(self.supertrend_multiplier),
            },
            IndicatorType::Bollinger {
                period: self.bb_period,
                stddev_mult_x100: mult_x100(self.bb_multiplier),
            },
            IndicatorType::Macd {
                fast: self.macd_fast,
                slow: self.macd_slow,
                signal: self.macd_signal,
            },
            IndicatorType::Squeeze {
                bb_period: self.bb_period,
                kc_period: self.keltner_period,
            },
        ]
    }

    fn squeeze_params(&self) -> SqueezeParams {
        SqueezeParams {
            mode: self.squeeze_mode,
            bb_period: self.bb_period,
            bb_mult_x100: mult_x100(self.bb_multiplier),
            kc_period: self.keltner_period,
            kc_mult_x100: mult_x100(self.keltner_multiplier),
        }
    }
}

/// Indicator values at one sealed candle.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    /// Sealed index of the candle (see `SealedCandleEvent::index`).
    pub candle_index: usize,
    pub rsi: f64,
    pub atr: f64,
    pub supertrend_value: f64,
    pub supertrend_direction: Trend,
    pub bb_mid: f64,
    pub bb_upper: f64,
    pub bb_lower: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_hist: f64,
    pub squeeze: bool,
}

/// Result of evaluating the indicators on a closed history.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Ready(IndicatorSnapshot),
    InsufficientData { have: usize, need: usize },
}

impl Reading {
    pub fn snapshot(&self) -> Option<&IndicatorSnapshot> {
        match self {
            Reading::Ready(snapshot) => Some(snapshot),
            Reading::InsufficientData { .. } => None,
        }
    }
}

pub fn compute(closed: &[Candle], config: &IndicatorConfig) -> Reading {
    let need = config.required_lookback();
    let insufficient = Reading::InsufficientData {
        have: closed.len(),
        need,
    };
    if closed.len() < need || closed.is_empty() {
        return insufficient;
    }

    let rsi = calculate_rsi(closed, config.rsi_period);
    let atr = calculate_atr(closed, config.atr_period);
    let supertrend = calculate_supertrend(
        closed,
        config.atr_period,
        mult_x100(config.supertrend_multiplier),
    );
    let bollinger = calculate_bollinger(closed, config.bb_period, mult_x100(config.bb_multiplier));
    let macd = calculate_macd(closed, config.macd_fast, config.macd_slow, config.macd_signal);
    let squeeze = calculate_squeeze(closed, &config.squeeze_params());

    let (Some(rsi), Some(atr)) = (
        rsi.last_valid().and_then(|p| p.simple()),
        atr.last_valid().and_then(|p| p.simple()),
    ) else {
        return insufficient;
    };
    let Some(IndicatorValue::Supertrend { line, trend }) =
        supertrend.last_valid().map(|p| p.value.clone())
    else {
        return insufficient;
    };
    let Some(IndicatorValue::Bollinger {
        upper,
        middle,
        lower,
    }) = bollinger.last_valid().map(|p| p.value.clone())
    else {
        return insufficient;
    };
    let Some(IndicatorValue::Macd {
        line: macd_line,
        signal,
        histogram,
    }) = macd.last_valid().map(|p| p.value.clone())
    else {
        return insufficient;
    };
    let Some(IndicatorValue::Flag(squeeze)) = squeeze.last_valid().map(|p| p.value.clone()) else {
        return insufficient;
    };

    Reading::Ready(IndicatorSnapshot {
        candle_index: closed.len() - 1,
        rsi,
        atr,
        supertrend_value: line,
        supertrend_direction: trend,
        bb_mid: middle,
        bb_upper: upper,
        bb_lower: lower,
        macd_line,
        macd_signal: signal,
        macd_hist: histogram,
        squeeze,
    })
}
