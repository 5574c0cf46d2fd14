//! Per-transfer driver task
//!
//! The driver owns the backing handle. It feeds every output record through
//! the parser and reconciler, waits for the exit, and emits exactly one
//! terminal event: `complete` on a natural exit or `timeout` when the
//! record's cancel token fires first. The handle is released afterwards.

use super::Transfer;
use crate::runtime::BackingHandle;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Upper bound on waiting for a terminated handle to exit
const EXIT_GRACE: Duration = Duration::from_secs(15);

/// Spawn the driver for `transfer`
pub fn spawn_driver(transfer: Arc<Transfer>, handle: Box<dyn BackingHandle>) -> JoinHandle<()> {
    tokio::spawn(drive(transfer, handle))
}

enum Outcome {
    Exited(Option<i32>),
    Cancelled,
}

async fn drive(transfer: Arc<Transfer>, mut handle: Box<dyn BackingHandle>) {
    let cancel = transfer.cancel_token();
    let id = transfer.id().clone();
    tracing::debug!(transfer_id = %id, handle = %handle.id(), "driver started");

    let mut outcome = None;
    if let Some(mut lines) = handle.take_output() {
        loop {
            tokio::select! {
                biased;
                line = lines.next() => match line {
                    Some(line) => transfer.ingest(&line).await,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    outcome = Some(Outcome::Cancelled);
                    break;
                }
            }
        }
    }

    let mut outcome = match outcome {
        Some(outcome) => outcome,
        None => tokio::select! {
            biased;
            exit = handle.wait() => match exit {
                Ok(code) => Outcome::Exited(code),
                // an unreadable exit after a stop request is the stop itself
                Err(e) if cancel.is_cancelled() => {
                    tracing::debug!(transfer_id = %id, error = %e, "handle gone after stop request");
                    Outcome::Cancelled
                }
                Err(e) => Outcome::Exited(exit_code(&transfer, Err(e))),
            },
            _ = cancel.cancelled() => Outcome::Cancelled,
        },
    };
    if matches!(outcome, Outcome::Cancelled)
        && !handle.is_running().await
        && let Ok(code) = handle.wait().await
    {
        // exited on its own before the stop landed
        outcome = Outcome::Exited(code);
    }

    match outcome {
        Outcome::Exited(code) => {
            transfer.complete(code).await;
            tracing::info!(transfer_id = %id, exit_code = ?code, "transfer finished");
        }
        Outcome::Cancelled => {
            if let Err(e) = handle.terminate().await {
                tracing::warn!(transfer_id = %id, error = %e, "failed to terminate handle");
            }
            if tokio::time::timeout(EXIT_GRACE, handle.wait()).await.is_err() {
                tracing::warn!(transfer_id = %id, "handle did not exit after terminate");
            }
            transfer.time_out().await;
            tracing::info!(
                transfer_id = %id,
                reason = ?transfer.cancel_reason(),
                "transfer stopped"
            );
        }
    }

    if let Err(e) = handle.release().await {
        tracing::debug!(transfer_id = %id, error = %e, "failed to release handle");
    }
    transfer.mark_finished();
}

fn exit_code(transfer: &Transfer, exit: crate::Result<Option<i32>>) -> Option<i32> {
    exit.unwrap_or_else(|e| {
        tracing::warn!(transfer_id = %transfer.id(), error = %e, "failed to read exit status");
        None
    })
}
