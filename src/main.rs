//! croc-relay server
//!
//! Reads configuration from `CROC_RELAY_*` environment variables (a `.env`
//! file is loaded first), starts the supervisor and the REST API, and stops
//! every live transfer on SIGINT/SIGTERM.

use croc_relay::api::start_api_server;
use croc_relay::{Config, TransferManager, run_with_shutdown};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("failed to load .env: {e}");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,croc_relay=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let manager = TransferManager::from_config(config)?;
    let supervisor = manager.start_supervisor();

    let server = tokio::spawn(start_api_server(manager.clone()));

    tokio::select! {
        result = run_with_shutdown(manager.clone()) => result?,
        joined = server => {
            // server exited on its own: stop transfers before reporting it
            manager.shutdown().await;
            joined??;
        }
    }

    supervisor.abort();
    tracing::info!("croc-relay stopped");
    Ok(())
}
