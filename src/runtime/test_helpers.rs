//! Scripted in-memory runtime for tests
//!
//! Each `start` hands the test a [`HandleController`] over a channel; the test
//! writes output lines and decides when (and how) the handle exits.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::lines::output_lines;
use super::{
    BackingHandle, ContainerPool, ContainerSummary, LaunchSpec, LineStream, TransferRuntime,
    describe_send,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

/// Exit code reported by a scripted handle after `terminate`
pub(crate) const TERMINATED_EXIT: i32 = -15;

/// What happened to a scripted handle
#[derive(Debug, Default)]
pub(crate) struct HandleProbe {
    terminated: AtomicBool,
    released: AtomicBool,
}

impl HandleProbe {
    pub(crate) fn terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

/// Test-side end of a scripted handle
pub(crate) struct HandleController {
    pub(crate) launch: Option<LaunchSpec>,
    pub(crate) probe: Arc<HandleProbe>,
    writer: Option<DuplexStream>,
    exit: Option<oneshot::Sender<i32>>,
}

impl HandleController {
    /// Write raw bytes to the handle's output
    pub(crate) async fn emit_raw(&mut self, bytes: &[u8]) {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_all(bytes).await.unwrap();
        }
    }

    /// Write one newline-terminated line
    pub(crate) async fn emit(&mut self, line: &str) {
        self.emit_raw(format!("{line}\n").as_bytes()).await;
    }

    /// Close the output stream and report `code` as the exit status
    pub(crate) fn exit(&mut self, code: i32) {
        self.writer.take();
        if let Some(exit) = self.exit.take() {
            let _ = exit.send(code);
        }
    }
}

/// Handle side, owned by the transfer driver
pub(crate) struct ScriptedHandle {
    id: String,
    command: String,
    output: Option<LineStream>,
    exit_rx: Option<oneshot::Receiver<i32>>,
    exited: Option<Option<i32>>,
    probe: Arc<HandleProbe>,
}

/// Build a connected handle/controller pair
pub(crate) fn scripted_pair(id: &str, command: &str) -> (ScriptedHandle, HandleController) {
    let (writer, reader) = tokio::io::duplex(64 * 1024);
    let (exit_tx, exit_rx) = oneshot::channel();
    let probe = Arc::new(HandleProbe::default());
    let handle = ScriptedHandle {
        id: id.into(),
        command: command.into(),
        output: Some(output_lines(reader)),
        exit_rx: Some(exit_rx),
        exited: None,
        probe: probe.clone(),
    };
    let controller = HandleController {
        launch: None,
        probe,
        writer: Some(writer),
        exit: Some(exit_tx),
    };
    (handle, controller)
}

#[async_trait]
impl BackingHandle for ScriptedHandle {
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
        if let Some(exited) = self.exited {
            return Ok(exited);
        }
        let code = match self.exit_rx.as_mut() {
            Some(rx) => rx.await.ok(),
            None => None,
        };
        self.exit_rx = None;
        self.exited = Some(code);
        Ok(code)
    }

    async fn terminate(&mut self) -> Result<()> {
        self.probe.terminated.store(true, Ordering::SeqCst);
        self.output = None;
        self.exit_rx = None;
        self.exited.get_or_insert(Some(TERMINATED_EXIT));
        Ok(())
    }

    async fn is_running(&mut self) -> bool {
        if self.exited.is_some() {
            return false;
        }
        let Some(rx) = self.exit_rx.as_mut() else {
            return false;
        };
        match rx.try_recv() {
            Ok(code) => {
                self.exited = Some(Some(code));
                false
            }
            Err(oneshot::error::TryRecvError::Empty) => true,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.exited = Some(None);
                false
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        self.probe.released.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Runtime whose handles are driven by the test
pub(crate) struct ScriptedRuntime {
    controllers: mpsc::UnboundedSender<HandleController>,
    fail_next: AtomicBool,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<HandleController>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                controllers: tx,
                fail_next: AtomicBool::new(false),
            }),
            rx,
        )
    }

    /// Make the next `start` fail as if croc were missing
    pub(crate) fn fail_next_start(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransferRuntime for ScriptedRuntime {
    async fn start(&self, launch: &LaunchSpec) -> Result<Box<dyn BackingHandle>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::ExternalToolUnavailable(
                "croc is not installed or not in PATH".into(),
            ));
        }
        let command = describe_send(launch.hash, &launch.path.absolute.to_string_lossy());
        let (handle, mut controller) =
            scripted_pair(&format!("scripted-{}", launch.transfer_id), &command);
        controller.launch = Some(launch.clone());
        let _ = self.controllers.send(controller);
        Ok(Box::new(handle))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// In-memory container pool for reaper tests
#[derive(Default)]
pub(crate) struct FakePool {
    pub(crate) containers: Mutex<Vec<ContainerSummary>>,
    pub(crate) logs: Mutex<HashMap<String, String>>,
    pub(crate) removed: Mutex<Vec<String>>,
    pub(crate) attached: Mutex<Vec<HandleController>>,
    pub(crate) fail_list: AtomicBool,
    pub(crate) fail_remove: AtomicBool,
}

impl FakePool {
    pub(crate) fn add(&self, container: ContainerSummary, logs: &str) {
        self.logs
            .lock()
            .unwrap()
            .insert(container.id.clone(), logs.to_string());
        self.containers.lock().unwrap().push(container);
    }

    pub(crate) fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerPool for FakePool {
    async fn list(&self, _label: &str) -> Result<Vec<ContainerSummary>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(Error::RuntimeListing("daemon unreachable".into()));
        }
        Ok(self.containers.lock().unwrap().clone())
    }

    async fn logs(&self, container_id: &str, _tail: usize) -> Result<Vec<u8>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(container_id)
            .cloned()
            .unwrap_or_default()
            .into_bytes())
    }

    async fn remove(&self, container_id: &str, _force: bool) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(Error::ExternalTool("docker rm failed".into()));
        }
        self.removed.lock().unwrap().push(container_id.to_string());
        self.containers
            .lock()
            .unwrap()
            .retain(|c| c.id != container_id);
        Ok(())
    }

    async fn attach(&self, container: &ContainerSummary) -> Result<Box<dyn BackingHandle>> {
        let (handle, controller) = scripted_pair(&container.id, "croc send --hash imohash /files/x");
        self.attached.lock().unwrap().push(controller);
        Ok(Box::new(handle))
    }
}
