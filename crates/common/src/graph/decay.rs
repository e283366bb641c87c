//! Periodic interaction score decay

use super::InteractionScoreStore;
use crate::errors::Result;
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Outcome of one decay cycle
#[derive(Debug, Clone, Serialize)]
pub struct DecayReport {
    pub started_at: DateTime<Utc>,
    pub processed_keys: usize,
    pub duration_ms: u64,
}

/// Runs `apply_decay` on a fixed period, off the request path.
///
/// A failed cycle is logged and counted; the next tick runs as usual.
pub struct DecayScheduler {
    store: Arc<dyn InteractionScoreStore>,
    period: Duration,
}

impl DecayScheduler {
    pub fn new(store: Arc<dyn InteractionScoreStore>, period: Duration) -> Self {
        Self { store, period }
    }

    /// Run a single decay cycle
    pub async fn run_once(&self) -> Result<DecayReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = self.store.apply_decay().await;
        let elapsed = start.elapsed();
        metrics::record_decay(elapsed.as_secs_f64(), outcome.as_ref().ok().copied());

        let processed_keys = outcome?;
        Ok(DecayReport {
            started_at,
            processed_keys,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    /// Tick until `shutdown` flips to true. The first cycle runs one period
    /// after start so restarts do not decay twice in a row.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.period,
            self.period,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(period_secs = self.period.as_secs(), "Decay scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) => info!(
                            processed_keys = report.processed_keys,
                            duration_ms = report.duration_ms,
                            "Decay cycle complete"
                        ),
                        Err(e) => error!(error = %e, "Decay cycle failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Decay scheduler stopped");
    }
}
