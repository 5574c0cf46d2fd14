//! Transfer records
//!
//! A [`Transfer`] holds the immutable launch details, the reconciled
//! [`TransferState`] and the event log. Only the transfer's driver task
//! writes the state and pushes events after the start event; everything else
//! reads snapshots or requests cancellation through the record's token.

pub mod driver;
pub mod events;
pub mod registry;

pub use driver::spawn_driver;
pub use events::{EventQueue, Subscription};
pub use registry::TransferRegistry;

use crate::parser::Signals;
use crate::reconcile::TransferState;
use crate::types::{HashAlgorithm, TransferEvent, TransferId, TransferInfo, TransferStatus};
use chrono::{DateTime, Utc};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Why a transfer was asked to stop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// The supervisor's age limit was exceeded
    TimedOut,
    /// The control plane is shutting down
    Shutdown,
}

impl CancelReason {
    /// Message carried by the resulting timeout event
    pub fn message(self) -> &'static str {
        match self {
            Self::TimedOut => "Transfer timed out.",
            Self::Shutdown => "Transfer stopped: server shutting down.",
        }
    }
}

/// Launch details of a new record
#[derive(Clone, Debug)]
pub struct TransferInit {
    /// Identifier
    pub id: TransferId,
    /// Name as supplied by the caller (or recovered from container labels)
    pub source_name: String,
    /// Hash algorithm in use
    pub hash: HashAlgorithm,
    /// Display form of the launch command
    pub command: String,
    /// Runtime-specific handle identifier
    pub handle_id: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// One transfer known to the registry
#[derive(Debug)]
pub struct Transfer {
    id: TransferId,
    source_name: String,
    hash: HashAlgorithm,
    command: String,
    handle_id: String,
    created_at: DateTime<Utc>,
    state: RwLock<TransferState>,
    events: EventQueue,
    cancel: CancellationToken,
    cancel_reason: OnceLock<CancelReason>,
    finished: CancellationToken,
}

impl Transfer {
    /// Create a record in the `starting` state
    pub fn new(init: TransferInit) -> Self {
        Self::with_state(init, TransferState::default())
    }

    /// Create a record seeded with an already-reconciled state
    pub fn with_state(init: TransferInit, state: TransferState) -> Self {
        Self {
            id: init.id,
            source_name: init.source_name,
            hash: init.hash,
            command: init.command,
            handle_id: init.handle_id,
            created_at: init.created_at,
            state: RwLock::new(state),
            events: EventQueue::new(),
            cancel: CancellationToken::new(),
            cancel_reason: OnceLock::new(),
            finished: CancellationToken::new(),
        }
    }

    /// Transfer identifier
    pub fn id(&self) -> &TransferId {
        &self.id
    }

    /// Source name
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Hash algorithm
    pub fn hash(&self) -> HashAlgorithm {
        self.hash
    }

    /// Launch command
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Runtime-specific handle identifier
    pub fn handle_id(&self) -> &str {
        &self.handle_id
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    /// Copy of the current state
    pub async fn state(&self) -> TransferState {
        self.state.read().await.clone()
    }

    /// Current status
    pub async fn status(&self) -> TransferStatus {
        self.state.read().await.status
    }

    /// Point-in-time snapshot for the polling endpoints
    pub async fn info(&self) -> TransferInfo {
        let state = self.state.read().await;
        TransferInfo {
            id: self.id.clone(),
            source_name: self.source_name.clone(),
            hash: self.hash,
            status: state.status,
            progress: state.progress,
            code: state.code.clone(),
            last_output: state.last_output.clone(),
            speed: state.speed.clone(),
            eta: state.eta.clone(),
            command: self.command.clone(),
            created_at: self.created_at,
            age_secs: self.age(Utc::now()).as_secs(),
        }
    }

    /// Subscribe to the event log from the first event
    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    /// Copy of every event produced so far
    pub fn events(&self) -> Vec<TransferEvent> {
        self.events.snapshot()
    }

    /// Ask the driver to stop the transfer; the first reason wins
    pub fn request_cancel(&self, reason: CancelReason) {
        let _ = self.cancel_reason.set(reason);
        self.cancel.cancel();
    }

    /// Reason given to the first [`Transfer::request_cancel`]
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason.get().copied()
    }

    /// Token cancelled when a stop is requested
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Token cancelled once the driver has emitted the terminal event and released the handle
    pub fn finished_token(&self) -> CancellationToken {
        self.finished.clone()
    }

    /// Whether the driver has finished
    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    pub(crate) fn emit_start(&self) {
        self.events.push(TransferEvent::Start {
            status: TransferStatus::Starting,
            command: self.command.clone(),
        });
    }

    /// Reconcile one log line and emit the matching output event
    pub(crate) async fn ingest(&self, line: &str) {
        let signals = Signals::from_line(line);
        let event = {
            let mut state = self.state.write().await;
            if state.is_terminal() {
                return;
            }
            state.apply(&signals);
            TransferEvent::Output {
                line: signals.last_line.unwrap_or_else(|| line.trim().to_string()),
                status: state.status,
                progress: state.progress,
                code: state.code.clone(),
                speed: state.speed.clone(),
                eta: state.eta.clone(),
                filename: state.filename.clone(),
            }
        };
        self.events.push(event);
    }

    /// Record a natural exit and emit `complete`; no-op once terminal
    pub(crate) async fn complete(&self, exit_code: Option<i32>) -> bool {
        let status = {
            let mut state = self.state.write().await;
            if !state.finish(exit_code) {
                return false;
            }
            state.status
        };
        self.events.push(TransferEvent::Complete { status, exit_code });
        true
    }

    /// Record a forced stop and emit `timeout`; no-op once terminal
    pub(crate) async fn time_out(&self) -> bool {
        let status = {
            let mut state = self.state.write().await;
            if !state.time_out() {
                return false;
            }
            state.status
        };
        let message = self.cancel_reason().unwrap_or(CancelReason::TimedOut).message();
        self.events.push(TransferEvent::Timeout {
            status,
            message: message.to_string(),
        });
        true
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.cancel();
    }
}
