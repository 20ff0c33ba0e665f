#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use lanetrader::domain::config::EngineConfig;
use lanetrader::domain::error::GatewayError;
use lanetrader::domain::indicator::snapshot::IndicatorConfig;
use lanetrader::domain::indicator::squeeze::SqueezeMode;
use lanetrader::domain::tick::Tick;
use lanetrader::engine::events::EngineEvent;
use lanetrader::ports::clock::Clock;
use lanetrader::ports::order_gateway::{OrderAck, OrderGateway, OrderRequest, OrderStatus};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// 2024-01-15 09:15 IST.
pub fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 3, 45, 0).unwrap()
}

/// Short indicator periods so a signal appears within a few dozen candles.
pub fn fast_indicators() -> IndicatorConfig {
    IndicatorConfig {
        min_lookback: 10,
        rsi_period: 5,
        atr_period: 5,
        supertrend_multiplier: 1.0,
        bb_period: 10,
        bb_multiplier: 2.0,
        macd_fast: 3,
        macd_slow: 6,
        macd_signal: 3,
        keltner_period: 10,
        keltner_multiplier: 1.5,
        squeeze_mode: SqueezeMode::Keltner,
    }
}

/// One-minute lanes with [`fast_indicators`] and default risk.
pub fn fast_config() -> EngineConfig {
    let mut config = EngineConfig {
        indicators: fast_indicators(),
        ..EngineConfig::default()
    };
    config.session.timeframes = vec![1];
    config
}

/// Minute `i` close: a steady slide from 120 to 99.7, then a gap up to 105.7
/// and a climb of 1.0 per minute.
pub fn rally_close(i: u32) -> f64 {
    if i < 30 {
        120.0 - 0.7 * i as f64
    } else {
        105.7 + 1.0 * (i - 30) as f64
    }
}

/// Two ticks per minute: `close + 0.3` at :00 and `close` at :30.
///
/// On one-minute candles with [`fast_indicators`] this yields a single BUY
/// on candle 30 (close 105.7), sealed by the 04:16 tick at 107.0.
/// With default risk the position takes profit at 111.0 on minute 35.
pub fn rally_ticks(instrument: &str, minutes: u32) -> Vec<Tick> {
    let start = session_open();
    let mut ticks = Vec::with_capacity(minutes as usize * 2);
    for i in 0..minutes {
        let close = rally_close(i);
        let at = start + Duration::minutes(i as i64);
        ticks.push(Tick::new(instrument, close + 0.3, at));
        ticks.push(Tick::new(instrument, close, at + Duration::seconds(30)));
    }
    ticks
}

pub fn write_temp_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn ticks_csv(ticks: &[Tick]) -> String {
    let mut out = String::from("instrument,timestamp,price\n");
    for t in ticks {
        out.push_str(&format!(
            "{},{},{}\n",
            t.instrument,
            t.timestamp.to_rfc3339(),
            t.price
        ));
    }
    out
}

pub const FAST_INI: &str = r#"
[risk]
tp_pct = 0.05
sl_pct = 0.02
trail_pct = 0.01
max_trades_per_day = 3
squareoff_time = 15:15
max_open_positions = 10
per_trade_capital = 20000

[session]
utc_offset_minutes = 330
timeframes = 1

[indicators]
min_lookback = 10
rsi_period = 5
atr_period = 5
supertrend_multiplier = 1.0
bb_period = 10
bb_multiplier = 2.0
macd_fast = 3
macd_slow = 6
macd_signal = 3
keltner_period = 10
keltner_multiplier = 1.5
squeeze_mode = keltner

[signal]
rsi_buy_threshold = 60
rsi_sell_threshold = 40
"#;

/// Gateway whose every placement fails outright.
#[derive(Default)]
pub struct FailingGateway {
    pub placed: AtomicUsize,
}

#[async_trait]
impl OrderGateway for FailingGateway {
    async fn place(&self, _request: &OrderRequest) -> Result<OrderAck, GatewayError> {
        self.placed.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::Failure {
            reason: "broker offline".into(),
        })
    }

    async fn status(&self, order_ref: &str) -> Result<OrderStatus, GatewayError> {
        Err(GatewayError::UnknownOrder {
            order_ref: order_ref.to_string(),
        })
    }
}

/// Wall clock that starts at `base` and moves with tokio time, so a paused
/// test runtime controls it.
pub struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        TokioClock {
            base,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + Duration::from_std(self.start.elapsed()).unwrap()
    }
}

/// Waits for the first event matching `pred`, giving up after five seconds.
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
where
    F: FnMut(&EngineEvent) -> bool,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Everything already buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
    events
}
