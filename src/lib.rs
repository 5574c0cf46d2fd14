//! # croc-relay
//!
//! Control plane for sending files with [croc](https://github.com/schollz/croc).
//!
//! A caller picks a file or directory under a fixed root; croc-relay launches
//! `croc send` for it (as a local subprocess or inside a container), scrapes
//! the tool's output into a structured state (status, progress, share code),
//! and fans that state out to any number of subscribers as a sequence of
//! events ending in exactly one `complete` or `timeout`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use croc_relay::{Config, TransferManager};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = TransferManager::from_config(Config::from_env()?)?;
//!     manager.start_supervisor();
//!
//!     let transfer = manager.create("report.pdf", Some("imohash")).await?;
//!     let mut events = manager.subscribe(transfer.id()).await?;
//!     while let Some(event) = events.next().await {
//!         println!("{event:?}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Transfer manager façade
pub mod manager;
/// croc output scraping
pub mod parser;
/// File root resolution
pub mod paths;
/// Status reconciliation
pub mod reconcile;
/// Process and container runtimes
pub mod runtime;
/// Timeout and reaper supervision
pub mod supervisor;
/// Transfer records, event log, registry and driver
pub mod transfer;
/// Core types and events
pub mod types;

pub use config::{Config, RuntimeMode};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use manager::{EventStream, TransferManager};
pub use transfer::{CancelReason, Transfer, TransferRegistry};
pub use types::{HashAlgorithm, TransferEvent, TransferId, TransferInfo, TransferStatus};

/// Wait for a termination signal, then shut the manager down.
///
/// Every live transfer is stopped and ends with a `timeout` event before this
/// returns.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use croc_relay::{Config, TransferManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = TransferManager::from_config(Config::default())?;
///     run_with_shutdown(manager).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: TransferManager) -> Result<()> {
    wait_for_signal().await;
    manager.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // registration can fail in restricted environments
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
