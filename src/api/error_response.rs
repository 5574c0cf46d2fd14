//! HTTP error response handling for the API
//!
//! Maps domain errors to status codes and JSON error bodies.

use crate::error::{ApiError, Error, ToHttpStatus};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            tracing::warn!(error = %self, code = self.error_code(), "request failed");
        }

        let api_error: ApiError = self.into();
        (status_code, Json(api_error)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // no status attached; errors normally go through Error::into_response
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(response: Response) -> ApiError {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn invalid_selection_is_bad_request() {
        let response = Error::InvalidSelection("Invalid file selection.".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "invalid_selection");
        assert!(api_error.error.message.contains("Invalid file selection."));
    }

    #[tokio::test]
    async fn missing_tool_is_server_error_with_hint() {
        let response =
            Error::ExternalToolUnavailable("croc is not installed or not in PATH".into())
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let api_error = body_of(response).await;
        assert_eq!(api_error.error.code, "external_tool_unavailable");
        assert!(api_error.error.details.unwrap().get("hint").is_some());
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let response = Error::NotFound("tx-nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await.error.code, "not_found");
    }

    #[tokio::test]
    async fn config_error_carries_key() {
        let response = Error::config("CROC_RELAY_RUNTIME", "unknown runtime").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let details = body_of(response).await.error.details.unwrap();
        assert_eq!(details["key"], "CROC_RELAY_RUNTIME");
    }
}
