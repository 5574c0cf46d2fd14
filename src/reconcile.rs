//! Status reconciliation
//!
//! Folds parser [`Signals`] into a transfer's mutable state. The rules:
//!
//! 1. a progress value means `transferring`
//! 2. otherwise, a known code with no progress seen yet means `waiting`
//! 3. otherwise, a status hint is adopted while no progress has been seen
//!
//! The code is write-once and terminal statuses are frozen.

use crate::parser::Signals;
use crate::types::TransferStatus;

/// Mutable part of a transfer record
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransferState {
    /// Current status
    pub status: TransferStatus,
    /// Latest progress percentage
    pub progress: u8,
    /// Transfer code, once discovered
    pub code: Option<String>,
    /// Most recent non-empty log line
    pub last_output: String,
    /// Latest parsed speed
    pub speed: Option<String>,
    /// Latest parsed ETA
    pub eta: Option<String>,
    /// File name reported by the progress bar
    pub filename: Option<String>,
    /// Exit code once the handle finished on its own
    pub exit_code: Option<i32>,
    saw_progress: bool,
}

impl TransferState {
    /// Whether the status is terminal
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether any progress value has been applied
    pub fn saw_progress(&self) -> bool {
        self.saw_progress
    }

    /// Apply one batch of signals and return the resulting status
    pub fn apply(&mut self, signals: &Signals) -> TransferStatus {
        if self.is_terminal() {
            return self.status;
        }

        if let Some(line) = &signals.last_line {
            self.last_output.clone_from(line);
        }
        if self.code.is_none() {
            self.code = signals.code.clone().filter(|code| !code.is_empty());
        }
        if signals.speed.is_some() {
            self.speed.clone_from(&signals.speed);
        }
        if signals.eta.is_some() {
            self.eta.clone_from(&signals.eta);
        }
        if signals.filename.is_some() {
            self.filename.clone_from(&signals.filename);
        }

        if let Some(progress) = signals.progress {
            self.progress = progress.min(100);
            self.saw_progress = true;
            self.status = TransferStatus::Transferring;
        } else if self.code.is_some() && !self.saw_progress {
            self.status = TransferStatus::Waiting;
        } else if let Some(hint) = signals.hint
            && !self.saw_progress
        {
            self.status = hint.status();
        }

        self.status
    }

    /// Record a natural exit; returns `false` if the state was already terminal
    pub fn finish(&mut self, exit_code: Option<i32>) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.exit_code = exit_code;
        self.status = if exit_code == Some(0) {
            TransferStatus::Done
        } else {
            TransferStatus::Failed
        };
        true
    }

    /// Record a forced timeout; returns `false` if the state was already terminal
    pub fn time_out(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TransferStatus::Timeout;
        true
    }
}
