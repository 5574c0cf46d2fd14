//! One timer per transfer
//!
//! Besides the per-transfer timers, a cleanup loop drops finished records
//! once they are older than the stale age, whether or not anyone streamed
//! them.

use super::Supervisor;
use crate::transfer::{CancelReason, Transfer, TransferRegistry};
use crate::types::TransferId;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Cancels each transfer once it has been alive for `timeout`
#[derive(Clone, Debug)]
pub struct DirectSupervisor {
    timeout: Duration,
    cleanup_interval: Duration,
    stale_age: Duration,
}

impl DirectSupervisor {
    /// Create a supervisor with the given age limit
    ///
    /// Finished records are cleaned up every 60 seconds once they are older
    /// than `timeout`; see [`DirectSupervisor::with_cleanup`].
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cleanup_interval: Duration::from_secs(60),
            stale_age: timeout,
        }
    }

    /// Set how often finished records are dropped and how old they must be
    pub fn with_cleanup(mut self, interval: Duration, stale_age: Duration) -> Self {
        self.cleanup_interval = interval;
        self.stale_age = stale_age;
        self
    }

    /// The age limit
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Drop finished records older than the stale age
    pub async fn prune(&self, registry: &TransferRegistry) -> Vec<TransferId> {
        let now = Utc::now();
        let stale_age = self.stale_age;
        let pruned = registry
            .retain(|transfer| !transfer.is_finished() || transfer.age(now) <= stale_age)
            .await;
        for id in &pruned {
            debug!(transfer_id = %id, "dropped finished transfer");
        }
        pruned
    }
}

#[async_trait]
impl Supervisor for DirectSupervisor {
    fn watch(&self, transfer: &Arc<Transfer>) {
        let timeout = self.timeout;
        let id = transfer.id().clone();
        let cancel = transfer.cancel_token();
        let finished = transfer.finished_token();
        let target = Arc::downgrade(transfer);

        tokio::spawn(async move {
            tokio::select! {
                _ = finished.cancelled() => {}
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(transfer) = target.upgrade() {
                        info!(transfer_id = %id, timeout_secs = timeout.as_secs(), "transfer exceeded its age limit");
                        transfer.request_cancel(CancelReason::TimedOut);
                    }
                }
            }
        });
    }

    async fn run(&self, registry: Arc<TransferRegistry>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cleanup_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.prune(&registry).await;
                }
            }
        }
    }

    fn release_after_delivery(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}
