//! Wall-clock driver for a live engine.
//!
//! Lanes only see time through tick timestamps. The ticker checks the
//! square-off deadline against a [`Clock`] once a second, so positions are
//! closed on time even when every feed has gone quiet, and exits that
//! failed earlier keep being retried.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::domain::config::EngineConfig;
use crate::engine::lane::Command;
use crate::engine::manager::PositionManager;
use crate::ports::clock::Clock;

const CHECK_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) struct SquareOffTicker {
    clock: Arc<dyn Clock>,
    manager: Arc<PositionManager>,
    config: watch::Receiver<Arc<EngineConfig>>,
    /// Only watched for closing, which marks engine shutdown.
    commands: broadcast::Receiver<Command>,
}

impl SquareOffTicker {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        manager: Arc<PositionManager>,
        config: watch::Receiver<Arc<EngineConfig>>,
        commands: broadcast::Receiver<Command>,
    ) -> Self {
        SquareOffTicker {
            clock,
            manager,
            config,
            commands,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut interval = tokio::time::interval(CHECK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Err(RecvError::Closed) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                },
                _ = interval.tick() => self.check().await,
            }
        }
        debug!("square-off ticker stopped");
    }

    async fn check(&self) {
        let config = self.config.borrow().clone();
        let now = self.clock.now();
        let closed = self.manager.square_off_if_due(now, &config).await;
        if !closed.is_empty() {
            info!(positions = closed.len(), at = %now, "squared off on the wall clock");
        }
        self.manager.retry_pending_exits(now, &config).await;
    }
}
