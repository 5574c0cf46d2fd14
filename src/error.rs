//! Error types for croc-relay
//!
//! This module provides the error taxonomy for the control plane:
//! - Caller mistakes (bad or out-of-root selection)
//! - Unavailable external tooling (croc binary, docker, image pulls)
//! - Runtime failures while listing or removing containers
//! - HTTP status code mapping and structured error bodies for the API
//!
//! Parse misses are not errors: the log parser returns `Option` and never fails.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for croc-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for croc-relay
#[derive(Debug, Error)]
pub enum Error {
    /// The requested file is missing, empty, or resolves outside the permitted root
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// The croc executable, the container runtime, or the image could not be used
    #[error("external tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    /// A call into the external runtime failed after the handle was created
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Listing or removing containers failed during a reaper cycle
    #[error("runtime listing failed: {0}")]
    RuntimeListing(String),

    /// Transfer not found
    #[error("transfer not found: {0}")]
    NotFound(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "CROC_RELAY_RUNTIME")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "invalid_selection",
///     "message": "invalid selection: path escapes the file root"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "invalid_selection")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::InvalidSelection(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 500 Internal Server Error - the tool the transfer depends on is missing
            Error::ExternalToolUnavailable(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,

            // 502 Bad Gateway - the external runtime misbehaved
            Error::ExternalTool(_) => 502,
            Error::RuntimeListing(_) => 502,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::InvalidSelection(_) => "invalid_selection",
            Error::ExternalToolUnavailable(_) => "external_tool_unavailable",
            Error::ExternalTool(_) => "external_tool_error",
            Error::RuntimeListing(_) => "runtime_listing_failed",
            Error::NotFound(_) => "not_found",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::ExternalToolUnavailable(_) => Some(serde_json::json!({
                "hint": "install croc (or docker for container mode) and make sure it is on PATH",
            })),
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
