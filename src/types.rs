//! Core types for croc-relay

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Unique identifier for a transfer
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TransferId(pub String);

impl TransferId {
    /// Allocate a fresh identifier
    pub fn generate() -> Self {
        Self(format!("tx-{}", uuid::Uuid::new_v4().simple()))
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransferId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TransferId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transfer status
///
/// `Done`, `Failed` and `Timeout` are terminal: once reached they never change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Handle requested, no output yet
    #[default]
    Starting,
    /// croc is hashing / preparing the file
    Preparing,
    /// Code is known, waiting for the receiver
    Waiting,
    /// Bytes are moving
    Transferring,
    /// croc exited with code 0
    Done,
    /// croc exited with a non-zero code
    Failed,
    /// Forced out by the timeout supervisor
    Timeout,
}

impl TransferStatus {
    /// Whether no further transitions are permitted
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Timeout)
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Preparing => "preparing",
            Self::Waiting => "waiting",
            Self::Transferring => "transferring",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash algorithm passed to `croc send --hash`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Sampled hashing, fast on large files
    #[default]
    Imohash,
    /// croc's own default hashing
    Default,
}

impl HashAlgorithm {
    /// All algorithms the system knows about
    pub const ALL: [HashAlgorithm; 2] = [HashAlgorithm::Imohash, HashAlgorithm::Default];

    /// Parse a user-supplied name (case-insensitive); unknown names yield `None`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "imohash" => Some(Self::Imohash),
            "default" => Some(Self::Default),
            _ => None,
        }
    }

    /// Value for the `--hash` flag
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Imohash => "imohash",
            Self::Default => "default",
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured event pushed to a transfer's subscribers
///
/// Exactly one `Complete` or `Timeout` is produced per transfer and it is always
/// the last event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    /// The backing handle was started
    Start {
        /// Status at start (always `starting`)
        status: TransferStatus,
        /// Human-readable launch command
        command: String,
    },

    /// One log line was processed
    Output {
        /// The trimmed log line
        line: String,
        /// Status after applying the line
        status: TransferStatus,
        /// Latest progress percentage
        progress: u8,
        /// Transfer code, once discovered
        code: Option<String>,
        /// Transfer speed from the progress bar (e.g. `3.2MB/s`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<String>,
        /// Remaining time from the progress bar
        #[serde(default, skip_serializing_if = "Option::is_none")]
        eta: Option<String>,
        /// File name from the progress bar
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },

    /// The backing handle exited on its own
    Complete {
        /// `done` or `failed`
        status: TransferStatus,
        /// Exit code reported by the handle (`None` when it could not be determined)
        exit_code: Option<i32>,
    },

    /// The supervisor forced the transfer out
    Timeout {
        /// Always `timeout`
        status: TransferStatus,
        /// Human-readable reason
        message: String,
    },
}

impl TransferEvent {
    /// Whether this event ends the subscription
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Timeout { .. })
    }

    /// SSE event name, equal to the JSON `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Output { .. } => "output",
            Self::Complete { .. } => "complete",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Point-in-time snapshot of one transfer, served by the polling endpoints
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferInfo {
    /// Transfer identifier
    pub id: TransferId,
    /// File or folder name relative to the file root
    pub source_name: String,
    /// Hash algorithm in use
    pub hash: HashAlgorithm,
    /// Current status
    pub status: TransferStatus,
    /// Latest progress percentage
    pub progress: u8,
    /// Transfer code, once discovered
    pub code: Option<String>,
    /// Most recent non-empty log line
    pub last_output: String,
    /// Latest parsed transfer speed
    pub speed: Option<String>,
    /// Latest parsed remaining time
    pub eta: Option<String>,
    /// Launch command
    pub command: String,
    /// When the transfer was created
    pub created_at: DateTime<Utc>,
    /// Seconds since creation
    pub age_secs: u64,
}
