//! croc inside labeled containers, driven through the docker CLI
//!
//! Each transfer gets its own container with the file root mounted read-only
//! at `/files`. Containers carry labels so the reaper can find them again
//! after a restart:
//!
//! | Label | Value |
//! |---|---|
//! | `<settings.label>` | `true` |
//! | `croc-relay.transfer` | transfer id |
//! | `croc-relay.created` | unix seconds at creation |
//! | `croc-relay.hash` | hash algorithm |
//! | `croc-relay.source` | source name |

use super::lines::{merge_output, shared_output};
use super::{
    BackingHandle, ContainerPool, ContainerSummary, LaunchSpec, LineStream, TransferRuntime,
    describe_send,
};
use crate::error::{Error, Result};
use crate::types::{HashAlgorithm, TransferId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use tokio::process::{Child, Command};

const TRANSFER_LABEL: &str = "croc-relay.transfer";
const CREATED_LABEL: &str = "croc-relay.created";
const HASH_LABEL: &str = "croc-relay.hash";
const SOURCE_LABEL: &str = "croc-relay.source";

/// Mount point of the file root inside each container
pub const CONTAINER_MOUNT: &str = "/files";

/// Container launch settings
#[derive(Clone, Debug)]
pub struct DockerSettings {
    /// Image whose entrypoint is croc
    pub image: String,
    /// `--memory` value
    pub memory_limit: String,
    /// `--cpus` value
    pub cpu_limit: String,
    /// Ownership label key
    pub label: String,
}

#[derive(Clone, Debug)]
struct DockerCli {
    binary_path: PathBuf,
}

impl DockerCli {
    async fn output<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.binary_path)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    Error::ExternalToolUnavailable("docker is not installed or not in PATH".into())
                }
                _ => Error::ExternalToolUnavailable(format!("failed to execute docker: {e}")),
            })
    }

    /// Run a subcommand and return its stdout, failing on a non-zero exit
    async fn run<I, S>(&self, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let subcommand = args
            .first()
            .map(|a| a.as_ref().to_string_lossy().into_owned())
            .unwrap_or_default();
        let output = self.output(&args).await?;
        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "docker {subcommand} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs each transfer in its own container and doubles as the reaper's [`ContainerPool`]
#[derive(Clone, Debug)]
pub struct DockerRuntime {
    docker: DockerCli,
    settings: DockerSettings,
}

impl DockerRuntime {
    /// Create a runtime with an explicit docker binary path
    pub fn new(binary_path: PathBuf, settings: DockerSettings) -> Self {
        Self {
            docker: DockerCli { binary_path },
            settings,
        }
    }

    /// Attempt to find docker in PATH
    pub fn from_path(settings: DockerSettings) -> Option<Self> {
        which::which("docker")
            .ok()
            .map(|path| Self::new(path, settings))
    }

    /// Arguments for `docker run` (everything after the binary)
    pub fn run_args(&self, launch: &LaunchSpec) -> Vec<String> {
        let settings = &self.settings;
        let mount = format!(
            "{}:{CONTAINER_MOUNT}:ro",
            launch.path.root.to_string_lossy()
        );
        vec![
            "run".into(),
            "-d".into(),
            "--label".into(),
            format!("{}=true", settings.label),
            "--label".into(),
            format!("{TRANSFER_LABEL}={}", launch.transfer_id),
            "--label".into(),
            format!("{CREATED_LABEL}={}", launch.created_at.timestamp()),
            "--label".into(),
            format!("{HASH_LABEL}={}", launch.hash),
            "--label".into(),
            format!("{SOURCE_LABEL}={}", launch.source_name),
            "--memory".into(),
            settings.memory_limit.clone(),
            "--cpus".into(),
            settings.cpu_limit.clone(),
            "-v".into(),
            mount,
            settings.image.clone(),
            "send".into(),
            "--hash".into(),
            launch.hash.as_str().into(),
            container_target(&launch.path.relative_unix()),
        ]
    }

    fn handle(&self, id: String, command: String) -> ContainerHandle {
        ContainerHandle {
            docker: self.docker.clone(),
            id,
            command,
            follower: None,
        }
    }
}

fn container_target(relative: &str) -> String {
    format!("{CONTAINER_MOUNT}/{relative}")
}

#[async_trait]
impl TransferRuntime for DockerRuntime {
    async fn start(&self, launch: &LaunchSpec) -> Result<Box<dyn BackingHandle>> {
        let args = self.run_args(launch);
        let output = self.docker.output(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ExternalToolUnavailable(format!(
                "could not start container from image '{}': {}",
                self.settings.image,
                stderr.trim()
            )));
        }

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(Error::ExternalToolUnavailable(
                "docker run did not report a container id".into(),
            ));
        }

        tracing::debug!(
            transfer_id = %launch.transfer_id,
            container = %id,
            image = %self.settings.image,
            "started croc container"
        );

        let command = describe_send(
            launch.hash,
            &container_target(&launch.path.relative_unix()),
        );
        Ok(Box::new(self.handle(id, command)))
    }

    fn name(&self) -> &'static str {
        "container"
    }
}

#[async_trait]
impl ContainerPool for DockerRuntime {
    async fn list(&self, label: &str) -> Result<Vec<ContainerSummary>> {
        let format = format!(
            "{{{{.ID}}}}\t{{{{.State}}}}\t{{{{.CreatedAt}}}}\t{{{{.Label \"{TRANSFER_LABEL}\"}}}}\t{{{{.Label \"{CREATED_LABEL}\"}}}}\t{{{{.Label \"{HASH_LABEL}\"}}}}\t{{{{.Label \"{SOURCE_LABEL}\"}}}}"
        );
        let filter = format!("label={label}");
        let stdout = self
            .docker
            .run(["ps", "-a", "--no-trunc", "--filter", filter.as_str(), "--format", format.as_str()])
            .await
            .map_err(|e| Error::RuntimeListing(e.to_string()))?;

        Ok(stdout.lines().filter_map(parse_ps_line).collect())
    }

    async fn logs(&self, container_id: &str, tail: usize) -> Result<Vec<u8>> {
        let tail = tail.to_string();
        let output = self
            .docker
            .output(["logs", "--tail", tail.as_str(), container_id])
            .await?;
        if !output.status.success() {
            return Err(Error::ExternalTool(format!(
                "docker logs failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let mut combined = output.stdout;
        if !output.stderr.is_empty() {
            combined.push(b'\n');
            combined.extend_from_slice(&output.stderr);
        }
        Ok(combined)
    }

    async fn remove(&self, container_id: &str, force: bool) -> Result<()> {
        let args: &[&str] = if force {
            &["rm", "-f", container_id]
        } else {
            &["rm", container_id]
        };
        self.docker.run(args).await.map(|_| ())
    }

    async fn attach(&self, container: &ContainerSummary) -> Result<Box<dyn BackingHandle>> {
        let source = container.source_name.as_deref().unwrap_or(&container.id);
        let command = describe_send(
            container.hash.unwrap_or_default(),
            &container_target(source),
        );
        Ok(Box::new(self.handle(container.id.clone(), command)))
    }
}

/// Parse one line of the `docker ps` format used by [`ContainerPool::list`]
///
/// Fields: id, state, runtime creation time, transfer label, creation label,
/// hash label, source label.
pub fn parse_ps_line(line: &str) -> Option<ContainerSummary> {
    let mut fields = line.splitn(7, '\t');
    let id = fields.next()?.trim();
    if id.is_empty() {
        return None;
    }
    let state = fields.next().unwrap_or_default().trim();
    let runtime_created = fields.next().unwrap_or_default().trim();
    let transfer = fields.next().unwrap_or_default().trim();
    let created_label = fields.next().unwrap_or_default().trim();
    let hash = fields.next().unwrap_or_default().trim();
    let source = fields.next().unwrap_or_default().trim();

    let created_at = created_label
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| parse_docker_timestamp(runtime_created));

    Some(ContainerSummary {
        id: id.to_string(),
        running: state.eq_ignore_ascii_case("running"),
        transfer_id: (!transfer.is_empty()).then(|| TransferId::from(transfer)),
        created_at,
        hash: HashAlgorithm::parse(hash),
        source_name: (!source.is_empty()).then(|| source.to_string()),
    })
}

/// Parse docker's `CreatedAt` column, e.g. `2024-01-15 10:30:00 +0000 UTC`
fn parse_docker_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let mut parts = value.split_whitespace();
    let date = parts.next()?;
    let time = parts.next()?;
    let offset = parts.next()?;
    DateTime::parse_from_str(&format!("{date} {time} {offset}"), "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A container launched (or adopted) for one transfer
pub struct ContainerHandle {
    docker: DockerCli,
    id: String,
    command: String,
    follower: Option<Child>,
}

#[async_trait]
impl BackingHandle for ContainerHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn command(&self) -> &str {
        &self.command
    }

    fn take_output(&mut self) -> Option<LineStream> {
        if self.follower.is_some() {
            return None;
        }
        let mut command = Command::new(&self.docker.binary_path);
        command
            .args(["logs", "--follow", self.id.as_str()])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let shared = match shared_output(&mut command) {
            Ok(shared) => shared,
            Err(e) => {
                tracing::warn!(container = %self.id, error = %e, "failed to create log pipe");
                return None;
            }
        };
        let spawned = command.spawn();
        drop(command);
        match spawned {
            Ok(mut child) => {
                let lines = shared.unwrap_or_else(|| {
                    merge_output(child.stdout.take(), child.stderr.take())
                });
                self.follower = Some(child);
                Some(lines)
            }
            Err(e) => {
                tracing::warn!(container = %self.id, error = %e, "failed to follow container logs");
                None
            }
        }
    }

    async fn wait(&mut self) -> Result<Option<i32>> {
        let stdout = self.docker.run(["wait", self.id.as_str()]).await?;
        Ok(stdout.trim().parse().ok())
    }

    async fn terminate(&mut self) -> Result<()> {
        self.docker.run(["stop", self.id.as_str()]).await.map(|_| ())
    }

    async fn is_running(&mut self) -> bool {
        self.docker
            .run(["inspect", "-f", "{{.State.Running}}", self.id.as_str()])
            .await
            .map(|out| out.trim() == "true")
            .unwrap_or(false)
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(mut follower) = self.follower.take() {
            let _ = follower.start_kill();
        }
        self.docker.run(["rm", "-f", self.id.as_str()]).await.map(|_| ())
    }
}
