//! croc as a local subprocess

use super::lines::{merge_output, shared_output};
use super::{BackingHandle, LaunchSpec, LineStream, TransferRuntime, describe_send};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Grace period between SIGTERM and a hard kill
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Runs `croc send` as a child process of the control plane
///
/// ```ignore
/// let runtime = CrocProcessRuntime::from_path().expect("croc not found in PATH");
/// let handle = runtime.start(&launch).await?;
/// ```
#[derive(Clone, Debug)]
pub struct CrocProcessRuntime {
    binary_path: PathBuf,
}

impl CrocProcessRuntime {
    /// Create a runtime with an explicit croc binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find croc in PATH
    pub fn from_path() -> Option<Self> {
        which::which("croc").ok().map(Self::new)
    }

    /// Path of the croc binary in use
    pub fn binary_path(&self) -> &std::path::Path {
        &self.binary_path
    }

    fn spawn_error(&self, e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::NotFound => {
                Error::ExternalToolUnavailable("croc is not installed or not in PATH".into())
            }
            _ => Error::ExternalToolUnavailable(format!(
                "failed to start {}: {e}",
                self.binary_path.display()
            )),
        }
    }
}

#[async_trait]
impl TransferRuntime for CrocProcessRuntime {
    async fn start(&self, launch: &LaunchSpec) -> Result<Box<dyn BackingHandle>> {
        let target = launch.path.absolute.to_string_lossy().into_owned();
        let mut command = Command::new(&self.binary_path);
        command
            .arg("send")
            .arg("--hash")
            .arg(launch.hash.as_str())
            .arg(&launch.path.absolute)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let shared = shared_output(&mut command).map_err(|e| {
            Error::ExternalToolUnavailable(format!("failed to create output pipe: {e}"))
        })?;

        let spawned = command.spawn();
        // closes our copies of the pipe's write end so EOF follows the child's exit
        drop(command);
        let mut child = spawned.map_err(|e| self.spawn_error(e))?;

        let id = child
            .id()
            .map(|pid| format!("pid-{pid}"))
            .unwrap_or_else(|| "pid-unknown".into());
        let output = match shared {
            Some(output) => output,
            None => merge_output(child.stdout.take(), child.stderr.take()),
        };

        tracing::debug!(
            transfer_id = %launch.transfer_id,
            handle = %id,
            binary = %self.binary_path.display(),
            "spawned croc"
        );

        Ok(Box::new(ProcessHandle {
            child,
            id,
            command: describe_send(launch.hash, &target),
            output: Some(output),
        }))
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// A spawned croc child process
pub struct ProcessHandle {
    child: Child,
    id: String,
    command: String,
    output: Option<LineStream>,
}

impl ProcessHandle {
    #[cfg(unix)]
    fn signal_terminate(&self) -> bool {
        let Some(pid) = self.child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
            return false;
        };
        // SAFETY: signalling a pid we spawned and have not yet reaped
        unsafe { libc::kill(pid, libc::SIGTERM) == 0 }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&self) -> bool {
        false
    }
}

#[async_trait]
impl BackingHandle for ProcessHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn command(&self) -> &str {
        &self.command
    }

    fn take_output(&mut self) -> Option<LineStream> {
        self.output.take()
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.signal_terminate()
            && tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
                .await
                .is_ok()
        {
            return Ok(());
        }

        match self.child.kill().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    async fn release(&mut self) -> Result<()> {
        if self.is_running().await {
            self.child.start_kill()?;
        }
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::FileRoot;
    use crate::types::{HashAlgorithm, TransferId};
    use futures::StreamExt;

    async fn launch_for(dir: &tempfile::TempDir, name: &str) -> LaunchSpec {
        std::fs::write(dir.path().join(name), b"payload").unwrap();
        LaunchSpec {
            transfer_id: TransferId::generate(),
            source_name: name.into(),
            path: FileRoot::new(dir.path()).resolve(name).await.unwrap(),
            hash: HashAlgorithm::Imohash,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn from_path_matches_which() {
        let found = CrocProcessRuntime::from_path();
        match which::which("croc") {
            Ok(expected) => assert_eq!(found.unwrap().binary_path(), expected.as_path()),
            Err(_) => assert!(found.is_none()),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let launch = launch_for(&dir, "report.pdf").await;
        let runtime = CrocProcessRuntime::new(PathBuf::from("/nonexistent/croc-binary-xyz"));

        match runtime.start(&launch).await {
            Err(Error::ExternalToolUnavailable(message)) => {
                assert_eq!(message, "croc is not installed or not in PATH");
            }
            Err(other) => panic!("expected ExternalToolUnavailable, got {other:?}"),
            Ok(_) => panic!("expected start to fail"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn scripted_croc_output_and_exit_code() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let launch = launch_for(&dir, "report.pdf").await;

        let bin_dir = tempfile::tempdir().unwrap();
        let script = bin_dir.path().join("croc");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo \"Sending '$4'\"\n\
             echo 'Code is: 7421-olive-tiger-lamp' >&2\n\
             printf ' 50%%|\\r100%%|\\r'\n\
             exit 3\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runtime = CrocProcessRuntime::new(script);
        let mut handle = runtime.start(&launch).await.unwrap();
        assert!(handle.command().starts_with("croc send --hash imohash /"));
        assert!(handle.id().starts_with("pid-"));

        let lines: Vec<String> = handle.take_output().unwrap().collect().await;
        assert!(handle.take_output().is_none());
        // stderr lands between stdout records in write order
        assert_eq!(lines.len(), 4, "{lines:?}");
        assert!(lines[0].starts_with("Sending '") && lines[0].ends_with("report.pdf'"));
        assert_eq!(lines[1..], ["Code is: 7421-olive-tiger-lamp", "50%|", "100%|"]);

        assert_eq!(handle.wait().await.unwrap(), Some(3));
        assert!(!handle.is_running().await);
        handle.release().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_stops_a_running_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let launch = launch_for(&dir, "report.pdf").await;

        let bin_dir = tempfile::tempdir().unwrap();
        let script = bin_dir.path().join("croc");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut handle = CrocProcessRuntime::new(script).start(&launch).await.unwrap();
        assert!(handle.is_running().await);

        handle.terminate().await.unwrap();
        assert_eq!(handle.wait().await.unwrap(), None);
        assert!(!handle.is_running().await);
    }
}
