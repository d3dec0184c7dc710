/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Reclamation of abandoned sessions.
//!
//! The sweeper closes every session that outlived its TTL, or its drain grace
//! window, through [`SessionManager::close_if_expired`]. That path takes the
//! session lock and releases through the equipment worker, so a sweep racing
//! a late assignment never frees a number that was just bound.

use crate::clock::Clock;
use crate::ledger::{InMemoryJournal, Journal};
use crate::session::SessionManager;
use crate::types::{EquipmentId, SessionToken};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[cfg(test)]
mod tests;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Sessions closed by this sweep.
    pub sessions_closed: usize,
    /// Numbers handed back to their allocators.
    pub numbers_released: usize,
}

impl SweepReport {
    fn absorb(&mut self, released: &[u64]) {
        self.sessions_closed += 1;
        self.numbers_released += released.len();
    }
}

/// Periodic and on-demand reclaimer of expired sessions.
pub struct ReclamationSweeper<J: Journal = InMemoryJournal> {
    sessions: Arc<SessionManager<J>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl<J: Journal> ReclamationSweeper<J> {
    /// Creates a sweeper over `sessions` running every `interval`.
    #[must_use]
    pub fn new(sessions: Arc<SessionManager<J>>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            sessions,
            clock,
            interval,
        }
    }

    /// Interval between two periodic sweeps.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Closes every due session.
    pub async fn sweep_once(&self) -> SweepReport {
        let report = self.sweep(self.sessions.tokens()).await;
        if report.sessions_closed > 0 {
            info!(
                sessions_closed = report.sessions_closed,
                numbers_released = report.numbers_released,
                "sweep complete"
            );
        }
        report
    }

    /// Closes the due sessions of one equipment.
    pub async fn sweep_equipment(&self, equipment_id: EquipmentId) -> SweepReport {
        let report = self.sweep(self.sessions.tokens_for(equipment_id)).await;
        debug!(
            %equipment_id,
            sessions_closed = report.sessions_closed,
            numbers_released = report.numbers_released,
            "equipment sweep complete"
        );
        report
    }

    async fn sweep(&self, tokens: Vec<SessionToken>) -> SweepReport {
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();
        for token in tokens {
            match self.sessions.close_if_expired(token, now).await {
                Ok(Some(released)) => report.absorb(&released),
                Ok(None) => {}
                Err(e) => warn!(%token, error = %e, "failed to reclaim session"),
            }
        }
        report
    }

    /// Sweeps every [`interval`](Self::interval) until `shutdown` turns `true`.
    #[instrument(skip(self, shutdown))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        info!(interval_ms, "starting reclamation sweeper");

        let mut interval = tokio::time::interval(self.interval);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reclamation sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }
}
