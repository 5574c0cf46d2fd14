//! Route handlers for the REST API
//!
//! - [`transfers`] - Start, poll and stream transfers
//! - [`system`] - Health and OpenAPI

use crate::types::{TransferId, TransferStatus};
use axum::{
    Form,
    extract::{FromRequest, Multipart, Request},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

mod system;
mod transfers;

pub use system::*;
pub use transfers::*;

/// Form body for POST /transfer
#[derive(Debug, Default, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartTransferForm {
    /// File or directory name relative to the file root
    #[serde(default)]
    pub filename: Option<String>,
    /// Hash algorithm (`imohash` or `default`); anything else falls back to the configured default
    #[serde(default)]
    pub hash: Option<String>,
}

/// Response for a started transfer
#[derive(Debug, Deserialize, Serialize, utoipa::ToSchema)]
pub struct StartTransferResponse {
    /// Transfer identifier used by the polling and stream endpoints
    pub id: TransferId,
    /// Status at creation
    pub status: TransferStatus,
    /// Display form of the launch command
    pub command: String,
}

/// [`StartTransferForm`] read from either form encoding browsers send
///
/// `multipart/form-data` bodies are read field by field; anything else goes
/// through the urlencoded [`Form`] extractor.
pub struct StartTransferBody(pub StartTransferForm);

#[axum::async_trait]
impl<S> FromRequest<S> for StartTransferBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !multipart {
            let Form(form) = Form::<StartTransferForm>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            return Ok(Self(form));
        }

        let mut fields = Multipart::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        let mut form = StartTransferForm::default();
        while let Some(field) = fields.next_field().await.map_err(IntoResponse::into_response)? {
            let target = match field.name() {
                Some("filename") => &mut form.filename,
                Some("hash") => &mut form.hash,
                _ => continue,
            };
            *target = Some(field.text().await.map_err(IntoResponse::into_response)?);
        }
        Ok(Self(form))
    }
}
