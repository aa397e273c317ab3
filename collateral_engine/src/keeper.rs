//! Periodic liquidation keeper
//!
//! Every tick the keeper takes the engine lock, asks for debtors below the
//! liquidation threshold and, when there are any, runs one `liquidate_all`
//! sweep as the configured operator.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::SharedEngine;
use crate::error::EngineResult;
use crate::events::LiquidationRecord;
use crate::tracing_logger::CorrelationId;
use crate::types::AccountId;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct LiquidationKeeper {
    engine: SharedEngine,
    operator: AccountId,
    interval: Duration,
}

impl LiquidationKeeper {
    pub fn new(engine: SharedEngine, operator: AccountId) -> Self {
        Self {
            engine,
            operator,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One sweep. Returns the records of every debtor liquidated.
    pub async fn sweep_once(&self) -> EngineResult<Vec<LiquidationRecord>> {
        let sweep_id = CorrelationId::new();
        let mut engine = self.engine.lock().await;

        let flagged = engine.debtors_below_threshold()?;
        if flagged.is_empty() {
            debug!(sweep_id = %sweep_id, "No debtors below liquidation threshold");
            return Ok(Vec::new());
        }

        info!(sweep_id = %sweep_id, flagged = flagged.len(), "Starting liquidation sweep");
        let records = engine.liquidate_all(&self.operator)?;
        for record in &records {
            match serde_json::to_string(record) {
                Ok(payload) => info!(sweep_id = %sweep_id, user = %record.user, %payload, "Liquidation record"),
                Err(err) => warn!(sweep_id = %sweep_id, user = %record.user, error = %err, "Unserializable liquidation record"),
            }
        }
        Ok(records)
    }

    /// Sweeps on every tick until `shutdown` turns true or its sender drops
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), operator = %self.operator, "Liquidation keeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        error!(error = %err, kind = ?err.kind(), "Liquidation sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        warn!("Liquidation keeper stopped");
    }
}
