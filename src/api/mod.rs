//! REST API server module
//!
//! Exposes transfer creation, polling snapshots and per-transfer
//! server-sent event streams, plus health and OpenAPI endpoints.

use crate::{Result, TransferManager};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Transfers
/// - `POST /transfer` - Start sending a file (form: `filename`, `hash`)
/// - `POST /transfer/start` - Same as `POST /transfer`
/// - `GET /transfer/:id` - Snapshot of one transfer
/// - `GET /transfer/:id/stream` - Server-sent events for one transfer
/// - `GET /transfers` - Snapshots of every tracked transfer
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
pub fn create_router(manager: TransferManager) -> Router {
    let api = manager.config().api.clone();
    let state = AppState::new(manager);

    let router = Router::new()
        .route("/transfer", post(routes::start_transfer))
        .route("/transfer/start", post(routes::start_transfer))
        .route("/transfer/:id", get(routes::get_transfer))
        .route("/transfer/:id/stream", get(routes::stream_transfer))
        .route("/transfers", get(routes::list_transfers))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec));

    let router = if api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if api.cors_enabled {
        router.layer(build_cors_layer(&api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the listener fails or the task is dropped.
///
/// # Example
///
/// ```no_run
/// use croc_relay::{Config, TransferManager};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = TransferManager::from_config(Config::default())?;
/// croc_relay::api::start_api_server(manager).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(manager: TransferManager) -> Result<()> {
    let bind_address = manager.config().api.bind_address;

    tracing::info!(address = %bind_address, "Starting API server");

    let app = create_router(manager);
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
