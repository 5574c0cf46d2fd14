//! Process and container runtime boundary
//!
//! A [`TransferRuntime`] turns a [`LaunchSpec`] into a running
//! [`BackingHandle`]: a croc subprocess ([`process::CrocProcessRuntime`]) or a
//! labeled container ([`container::DockerRuntime`]). Container runtimes also
//! expose a [`ContainerPool`] so the reaper can list, scrape and remove the
//! containers it owns.

pub mod container;
pub mod lines;
pub mod process;

#[cfg(test)]
pub(crate) mod test_helpers;

use crate::error::Result;
use crate::paths::ResolvedPath;
use crate::types::{HashAlgorithm, TransferId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::time::Duration;

pub use container::{DockerRuntime, DockerSettings};
pub use process::CrocProcessRuntime;

/// Stream of trimmed, non-empty log records from a backing handle
pub type LineStream = BoxStream<'static, String>;

/// Everything a runtime needs to launch one `croc send`
#[derive(Clone, Debug)]
pub struct LaunchSpec {
    /// Identifier the new transfer will be registered under
    pub transfer_id: TransferId,
    /// Name as supplied by the caller
    pub source_name: String,
    /// Resolved selection inside the file root
    pub path: ResolvedPath,
    /// Hash algorithm for `--hash`
    pub hash: HashAlgorithm,
    /// Creation time of the transfer
    pub created_at: DateTime<Utc>,
}

/// Human-readable `croc send` invocation
pub fn describe_send(hash: HashAlgorithm, target: &str) -> String {
    format!("croc send --hash {hash} {target}")
}

/// A running croc instance
///
/// The transfer driver owns the handle exclusively: it takes the output
/// stream once, waits for the exit, and releases the handle after the
/// terminal event.
#[async_trait]
pub trait BackingHandle: Send {
    /// Runtime-specific identifier (pid or container id)
    fn id(&self) -> &str;

    /// Display form of the launch command
    fn command(&self) -> &str;

    /// Take the merged stdout/stderr record stream; `None` after the first call
    fn take_output(&mut self) -> Option<LineStream>;

    /// Wait for the handle to exit and report its exit code
    ///
    /// `Ok(None)` means the handle ended but no exit code could be determined
    /// (killed by a signal, container gone).
    async fn wait(&mut self) -> Result<Option<i32>>;

    /// Ask the handle to stop
    async fn terminate(&mut self) -> Result<()>;

    /// Whether the handle is still running
    async fn is_running(&mut self) -> bool;

    /// Free the resources behind the handle once the transfer has ended
    async fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Starts backing handles for new transfers
#[async_trait]
pub trait TransferRuntime: Send + Sync {
    /// Launch `croc send` for `launch`
    ///
    /// Fails with [`crate::Error::ExternalToolUnavailable`] when the binary,
    /// the container runtime or the image cannot be used.
    async fn start(&self, launch: &LaunchSpec) -> Result<Box<dyn BackingHandle>>;

    /// Short runtime name for logs
    fn name(&self) -> &'static str;
}

/// One labeled container as reported by the container runtime
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Container id
    pub id: String,
    /// Whether the container is running
    pub running: bool,
    /// Transfer the container was launched for, when labeled
    pub transfer_id: Option<TransferId>,
    /// Creation time, from the creation label or the runtime's own timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Hash algorithm label
    pub hash: Option<HashAlgorithm>,
    /// Source name label
    pub source_name: Option<String>,
}

impl ContainerSummary {
    /// Age relative to `now`; unknown creation times count as brand new
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        self.created_at
            .and_then(|created| (now - created).to_std().ok())
            .unwrap_or_default()
    }

    /// Transfer id to register the container under
    pub fn registry_id(&self) -> TransferId {
        self.transfer_id.clone().unwrap_or_else(|| {
            let short: String = self.id.chars().take(12).collect();
            TransferId::from(format!("ctr-{short}"))
        })
    }
}

/// Container-level operations used by the periodic reaper
#[async_trait]
pub trait ContainerPool: Send + Sync {
    /// List every container carrying `label`, running or not
    async fn list(&self, label: &str) -> Result<Vec<ContainerSummary>>;

    /// Last `tail` lines of a container's combined output
    async fn logs(&self, container_id: &str, tail: usize) -> Result<Vec<u8>>;

    /// Remove a container
    async fn remove(&self, container_id: &str, force: bool) -> Result<()>;

    /// Build a handle for a container started elsewhere
    async fn attach(&self, container: &ContainerSummary) -> Result<Box<dyn BackingHandle>>;
}
