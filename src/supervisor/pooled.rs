//! Periodic reaper over labeled containers
//!
//! Each cycle lists every container carrying the ownership label and, per
//! running container, derives a status from the tail of its logs. A
//! container stuck in `waiting` past the age limit is reaped: a tracked
//! transfer is cancelled and its driver removes the container, an untracked
//! container is force-removed directly. Running
//! containers the registry does not know are adopted, and records whose
//! container vanished from the listing are pruned once they are older than
//! the stale age. Failures are logged and the cycle moves on.

use super::Supervisor;
use crate::parser::Signals;
use crate::reconcile::TransferState;
use crate::runtime::{ContainerPool, ContainerSummary};
use crate::transfer::{CancelReason, Transfer, TransferInit, TransferRegistry, spawn_driver};
use crate::types::{TransferId, TransferStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Containers younger than this are never adopted, so a transfer that is
/// still being registered is not picked up twice
const ADOPTION_GRACE: Duration = Duration::from_secs(30);

/// What one reaper cycle did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Containers returned by the listing
    pub listed: usize,
    /// Containers removed for exceeding the age limit while waiting
    pub reaped: Vec<String>,
    /// Transfers adopted from unknown containers
    pub adopted: Vec<TransferId>,
    /// Records dropped because their container vanished
    pub pruned: Vec<TransferId>,
}

/// Single loop that reaps, adopts and prunes
pub struct PooledSupervisor {
    pool: Arc<dyn ContainerPool>,
    label: String,
    interval: Duration,
    max_age: Duration,
    stale_age: Duration,
    log_tail: usize,
}

impl PooledSupervisor {
    /// Create a reaper over `pool`
    pub fn new(
        pool: Arc<dyn ContainerPool>,
        label: impl Into<String>,
        interval: Duration,
        max_age: Duration,
        stale_age: Duration,
        log_tail: usize,
    ) -> Self {
        Self {
            pool,
            label: label.into(),
            interval,
            max_age,
            stale_age,
            log_tail,
        }
    }

    /// Run one reaper cycle
    pub async fn sweep(&self, registry: &TransferRegistry) -> SweepReport {
        let mut report = SweepReport::default();

        let containers = match self.pool.list(&self.label).await {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "container listing failed, skipping reaper cycle");
                return report;
            }
        };
        report.listed = containers.len();

        let now = Utc::now();
        let mut live = HashSet::new();

        for container in containers {
            let transfer_id = container.registry_id();
            live.insert(transfer_id.clone());
            if !container.running {
                continue;
            }

            let tail = match self.pool.logs(&container.id, self.log_tail).await {
                Ok(tail) => tail,
                Err(e) => {
                    warn!(container = %container.id, error = %e, "failed to read container logs");
                    continue;
                }
            };
            let signals = Signals::from_tail(&String::from_utf8_lossy(&tail), self.log_tail);
            let mut state = TransferState::default();
            state.apply(&signals);

            let age = container.age(now);
            if state.status == TransferStatus::Waiting && age > self.max_age {
                if let Some(transfer) = registry.get(&transfer_id).await
                    && !transfer.is_finished()
                {
                    // the driver stops and removes the container, then emits `timeout`
                    transfer.request_cancel(CancelReason::TimedOut);
                    info!(
                        container = %container.id,
                        transfer_id = %transfer_id,
                        age_secs = age.as_secs(),
                        "reaping transfer stuck waiting for a receiver"
                    );
                    report.reaped.push(container.id.clone());
                    continue;
                }
                match self.pool.remove(&container.id, true).await {
                    Ok(()) => {
                        info!(
                            container = %container.id,
                            transfer_id = %transfer_id,
                            age_secs = age.as_secs(),
                            "removed container stuck waiting for a receiver"
                        );
                        report.reaped.push(container.id.clone());
                    }
                    Err(e) => {
                        warn!(container = %container.id, error = %e, "failed to remove container");
                    }
                }
                continue;
            }

            if age >= ADOPTION_GRACE
                && !registry.contains(&transfer_id).await
                && let Some(id) = self.adopt(registry, &container, transfer_id, state, now).await
            {
                report.adopted.push(id);
            }
        }

        let stale_age = self.stale_age;
        report.pruned = registry
            .retain(|transfer| live.contains(transfer.id()) || transfer.age(now) <= stale_age)
            .await;
        for id in &report.pruned {
            debug!(transfer_id = %id, "pruned record whose container is gone");
        }

        report
    }

    async fn adopt(
        &self,
        registry: &TransferRegistry,
        container: &ContainerSummary,
        transfer_id: TransferId,
        state: TransferState,
        now: DateTime<Utc>,
    ) -> Option<TransferId> {
        let handle = match self.pool.attach(container).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(container = %container.id, error = %e, "failed to attach to container");
                return None;
            }
        };

        let transfer = Arc::new(Transfer::with_state(
            TransferInit {
                id: transfer_id.clone(),
                source_name: container
                    .source_name
                    .clone()
                    .unwrap_or_else(|| container.id.clone()),
                hash: container.hash.unwrap_or_default(),
                command: handle.command().to_string(),
                handle_id: handle.id().to_string(),
                created_at: container.created_at.unwrap_or(now),
            },
            state,
        ));
        transfer.emit_start();

        if !registry.insert_if_absent(transfer.clone()).await {
            return None;
        }
        spawn_driver(transfer, handle);
        info!(container = %container.id, transfer_id = %transfer_id, "adopted running container");
        Some(transfer_id)
    }
}

#[async_trait]
impl Supervisor for PooledSupervisor {
    fn watch(&self, _transfer: &Arc<Transfer>) {}

    async fn run(&self, registry: Arc<TransferRegistry>, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "container reaper started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.sweep(&registry).await;
                    debug!(
                        listed = report.listed,
                        reaped = report.reaped.len(),
                        adopted = report.adopted.len(),
                        pruned = report.pruned.len(),
                        "reaper cycle complete"
                    );
                }
            }
        }
        info!("container reaper stopped");
    }

    fn release_after_delivery(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "pooled"
    }
}
