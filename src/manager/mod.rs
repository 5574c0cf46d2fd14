//! Transfer manager
//!
//! [`TransferManager`] is the control plane's façade: it validates the
//! selection, starts a backing handle, registers the record, arms
//! supervision and spawns the driver. The HTTP layer only talks to it.

use crate::config::{Config, RuntimeMode};
use crate::error::{Error, Result};
use crate::paths::FileRoot;
use crate::runtime::{
    CrocProcessRuntime, DockerRuntime, DockerSettings, LaunchSpec, TransferRuntime,
};
use crate::supervisor::{DirectSupervisor, PooledSupervisor, Supervisor};
use crate::transfer::{
    CancelReason, Transfer, TransferInit, TransferRegistry, spawn_driver,
};
use crate::types::{TransferEvent, TransferId, TransferInfo};
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long shutdown waits for drivers to emit their terminal events
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Stream of events for one subscriber, ending after the terminal event
pub type EventStream = BoxStream<'static, TransferEvent>;

/// Entry point for creating and observing transfers
#[derive(Clone)]
pub struct TransferManager {
    config: Arc<Config>,
    files: FileRoot,
    registry: Arc<TransferRegistry>,
    runtime: Arc<dyn TransferRuntime>,
    supervisor: Arc<dyn Supervisor>,
    shutdown: CancellationToken,
}

impl TransferManager {
    /// Assemble a manager from explicit parts
    pub fn new(
        config: Config,
        runtime: Arc<dyn TransferRuntime>,
        supervisor: Arc<dyn Supervisor>,
    ) -> Self {
        Self {
            files: FileRoot::new(config.files.root.clone()),
            config: Arc::new(config),
            registry: Arc::new(TransferRegistry::new()),
            runtime,
            supervisor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the runtime and supervisor selected by `config.runtime.mode`
    ///
    /// Fails with [`Error::ExternalToolUnavailable`] when the required binary
    /// cannot be found.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let runtime_config = &config.runtime;
        let timeouts = &config.timeouts;

        let (runtime, supervisor): (Arc<dyn TransferRuntime>, Arc<dyn Supervisor>) =
            match runtime_config.mode {
                RuntimeMode::Process => {
                    let runtime = match &runtime_config.croc_path {
                        Some(path) => CrocProcessRuntime::new(path.clone()),
                        None if runtime_config.search_path => CrocProcessRuntime::from_path()
                            .ok_or_else(|| {
                                Error::ExternalToolUnavailable(
                                    "croc is not installed or not in PATH".into(),
                                )
                            })?,
                        None => {
                            return Err(Error::config(
                                "runtime.croc_path",
                                "croc_path must be set when search_path is disabled",
                            ));
                        }
                    };
                    (
                        Arc::new(runtime),
                        Arc::new(
                            DirectSupervisor::new(timeouts.transfer_timeout)
                                .with_cleanup(timeouts.cleanup_interval, timeouts.stale_age),
                        ),
                    )
                }
                RuntimeMode::Container => {
                    let settings = DockerSettings {
                        image: runtime_config.image.clone(),
                        memory_limit: runtime_config.memory_limit.clone(),
                        cpu_limit: runtime_config.cpu_limit.clone(),
                        label: runtime_config.label.clone(),
                    };
                    let runtime = match &runtime_config.docker_path {
                        Some(path) => DockerRuntime::new(path.clone(), settings),
                        None if runtime_config.search_path => DockerRuntime::from_path(settings)
                            .ok_or_else(|| {
                                Error::ExternalToolUnavailable(
                                    "docker is not installed or not in PATH".into(),
                                )
                            })?,
                        None => {
                            return Err(Error::config(
                                "runtime.docker_path",
                                "docker_path must be set when search_path is disabled",
                            ));
                        }
                    };
                    let runtime = Arc::new(runtime);
                    let supervisor = PooledSupervisor::new(
                        runtime.clone(),
                        runtime_config.label.clone(),
                        timeouts.cleanup_interval,
                        timeouts.transfer_timeout,
                        timeouts.stale_age,
                        runtime_config.log_tail_lines,
                    );
                    (runtime, Arc::new(supervisor))
                }
            };

        info!(
            runtime = runtime.name(),
            supervisor = supervisor.name(),
            root = %config.files.root.display(),
            "transfer manager configured"
        );
        Ok(Self::new(config, runtime, supervisor))
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Name of the active runtime
    pub fn runtime_name(&self) -> &'static str {
        self.runtime.name()
    }

    /// Spawn the supervisor's background loop
    pub fn start_supervisor(&self) -> JoinHandle<()> {
        let supervisor = self.supervisor.clone();
        let registry = self.registry.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { supervisor.run(registry, shutdown).await })
    }

    /// Start a transfer of `source_name` with the requested hash algorithm
    ///
    /// Invalid or unpermitted hash names fall back to the configured default.
    /// Nothing is registered when the selection is invalid or the runtime
    /// cannot start.
    pub async fn create(&self, source_name: &str, hash: Option<&str>) -> Result<Arc<Transfer>> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ExternalToolUnavailable(
                "server is shutting down".into(),
            ));
        }

        let hash = self.config.hashes.resolve(hash);
        let path = self.files.resolve(source_name).await?;
        let launch = LaunchSpec {
            transfer_id: TransferId::generate(),
            source_name: source_name.trim().to_string(),
            path,
            hash,
            created_at: Utc::now(),
        };

        let handle = self.runtime.start(&launch).await?;
        let transfer = Arc::new(Transfer::new(TransferInit {
            id: launch.transfer_id.clone(),
            source_name: launch.source_name.clone(),
            hash,
            command: handle.command().to_string(),
            handle_id: handle.id().to_string(),
            created_at: launch.created_at,
        }));
        transfer.emit_start();

        self.registry.insert(transfer.clone()).await;
        self.supervisor.watch(&transfer);
        spawn_driver(transfer.clone(), handle);

        info!(
            transfer_id = %transfer.id(),
            source = %transfer.source_name(),
            hash = %hash,
            runtime = self.runtime.name(),
            "transfer started"
        );
        Ok(transfer)
    }

    /// Look up a transfer
    pub async fn lookup(&self, id: &TransferId) -> Option<Arc<Transfer>> {
        self.registry.get(id).await
    }

    /// Snapshot of one transfer
    pub async fn info(&self, id: &TransferId) -> Result<TransferInfo> {
        match self.registry.get(id).await {
            Some(transfer) => Ok(transfer.info().await),
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    /// Snapshots of every known transfer, oldest first
    pub async fn list(&self) -> Vec<TransferInfo> {
        self.registry.snapshot().await
    }

    /// Subscribe to a transfer's events from the start event on
    ///
    /// The stream ends after the terminal event. With the process runtime the
    /// record leaves the registry once a subscriber has seen that event.
    pub async fn subscribe(&self, id: &TransferId) -> Result<EventStream> {
        let transfer = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let subscription = transfer.subscribe();
        drop(transfer);
        let registry = self.registry.clone();
        let release = self.supervisor.release_after_delivery();
        let id = id.clone();

        Ok(futures::stream::unfold(subscription, move |mut subscription| {
            let registry = registry.clone();
            let id = id.clone();
            async move {
                let event = subscription.next().await?;
                if release && event.is_terminal() && registry.remove(&id).await.is_some() {
                    debug!(transfer_id = %id, "released transfer after terminal event was delivered");
                }
                Some((event, subscription))
            }
        })
        .boxed())
    }

    /// Stop the supervisor, stop every live transfer and wait for their terminal events
    pub async fn shutdown(&self) {
        info!("shutting down transfer manager");
        self.shutdown.cancel();

        let transfers = self.registry.list().await;
        for transfer in &transfers {
            if !transfer.is_finished() {
                transfer.request_cancel(CancelReason::Shutdown);
            }
        }

        for transfer in &transfers {
            let finished = transfer.finished_token();
            if tokio::time::timeout(SHUTDOWN_GRACE, finished.cancelled())
                .await
                .is_err()
            {
                warn!(transfer_id = %transfer.id(), "transfer did not stop before shutdown deadline");
            }
        }
        info!(stopped = transfers.len(), "transfer manager stopped");
    }
}
