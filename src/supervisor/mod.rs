//! Timeout and reaper supervision
//!
//! Two strategies bound how long a transfer may wait for its receiver:
//!
//! - [`DirectSupervisor`] arms one timer per transfer and cancels it when the
//!   age limit passes. Used with the process runtime.
//! - [`PooledSupervisor`] runs a single periodic loop over every labeled
//!   container, reaping those stuck in `waiting`, adopting unknown ones and
//!   pruning records whose container vanished. Used with the container runtime.
//!
//! Supervisors never write transfer state. They request cancellation and the
//! transfer's driver emits the terminal event.

pub mod direct;
pub mod pooled;

pub use direct::DirectSupervisor;
pub use pooled::{PooledSupervisor, SweepReport};

use crate::transfer::{Transfer, TransferRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Bounds the lifetime of transfers
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Start supervising a freshly registered transfer
    fn watch(&self, transfer: &Arc<Transfer>);

    /// Run background supervision until `shutdown` is cancelled
    async fn run(&self, registry: Arc<TransferRegistry>, shutdown: CancellationToken);

    /// Whether a record should leave the registry once a subscriber has seen its terminal event
    fn release_after_delivery(&self) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
