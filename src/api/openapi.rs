//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the croc-relay REST API
///
/// Served at `/openapi.json`; Swagger UI (when enabled) lives at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "croc-relay REST API",
        version = "0.1.0",
        description = "Start croc transfers for files under a fixed root and follow their progress",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server")
    ),
    paths(
        crate::api::routes::start_transfer,
        crate::api::routes::get_transfer,
        crate::api::routes::list_transfers,
        crate::api::routes::stream_transfer,

        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
    ),
    components(schemas(
        crate::types::TransferId,
        crate::types::TransferStatus,
        crate::types::HashAlgorithm,
        crate::types::TransferEvent,
        crate::types::TransferInfo,

        crate::api::routes::StartTransferForm,
        crate::api::routes::StartTransferResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "transfers", description = "Start transfers, poll their state and stream their events"),
        (name = "system", description = "Health checks and OpenAPI spec"),
    )
)]
pub struct ApiDoc;
