//! Transfer handlers.

use super::{StartTransferBody, StartTransferForm, StartTransferResponse};
use crate::api::AppState;
use crate::error::Error;
use crate::types::{TransferId, TransferInfo};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use std::convert::Infallible;
use tokio_stream::{Stream, StreamExt};

/// POST /transfer - Start sending a file
///
/// Accepts urlencoded and multipart form bodies.
#[utoipa::path(
    post,
    path = "/transfer",
    tag = "transfers",
    request_body(
        content = StartTransferForm,
        description = "Form fields, urlencoded or multipart/form-data",
        content_type = "application/x-www-form-urlencoded"
    ),
    responses(
        (status = 201, description = "Transfer started", body = StartTransferResponse),
        (status = 400, description = "Invalid file selection", body = crate::error::ApiError),
        (status = 500, description = "croc or docker is unavailable", body = crate::error::ApiError)
    )
)]
pub async fn start_transfer(
    State(state): State<AppState>,
    StartTransferBody(form): StartTransferBody,
) -> Result<(StatusCode, Json<StartTransferResponse>), Error> {
    let filename = form.filename.unwrap_or_default();
    let transfer = state
        .manager
        .create(&filename, form.hash.as_deref())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(StartTransferResponse {
            id: transfer.id().clone(),
            status: transfer.status().await,
            command: transfer.command().to_string(),
        }),
    ))
}

/// GET /transfer/:id - Snapshot of one transfer
#[utoipa::path(
    get,
    path = "/transfer/{id}",
    tag = "transfers",
    params(
        ("id" = String, Path, description = "Transfer ID")
    ),
    responses(
        (status = 200, description = "Transfer snapshot", body = TransferInfo),
        (status = 404, description = "Transfer not found", body = crate::error::ApiError)
    )
)]
pub async fn get_transfer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TransferInfo>, Error> {
    state.manager.info(&TransferId(id)).await.map(Json)
}

/// GET /transfers - Snapshots of every tracked transfer
#[utoipa::path(
    get,
    path = "/transfers",
    tag = "transfers",
    responses(
        (status = 200, description = "All tracked transfers, oldest first", body = Vec<TransferInfo>)
    )
)]
pub async fn list_transfers(State(state): State<AppState>) -> Json<Vec<TransferInfo>> {
    Json(state.manager.list().await)
}

/// GET /transfer/:id/stream - Server-sent events for one transfer
///
/// Replays every event from `start` on. The SSE event name is the event's
/// `type`; the stream closes after `complete` or `timeout`.
#[utoipa::path(
    get,
    path = "/transfer/{id}/stream",
    tag = "transfers",
    params(
        ("id" = String, Path, description = "Transfer ID")
    ),
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream"),
        (status = 404, description = "Transfer not found", body = crate::error::ApiError)
    )
)]
pub async fn stream_transfer(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, Error> {
    let events = state.manager.subscribe(&TransferId(id)).await?;

    let stream = events.filter_map(|event| match serde_json::to_string(&event) {
        Ok(data) => Some(Ok(SseEvent::default().event(event.kind()).data(data))),
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize transfer event");
            None
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
