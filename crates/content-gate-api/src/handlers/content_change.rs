//! Content-change webhook handler.
//!
//! Buffers the body, hands it to the gate with the request headers, and
//! maps the outcome onto the HTTP contract.

use axum::{
    extract::{rejection::BytesRejection, State},
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
    Json,
};
use bytes::Bytes;
use content_gate_core::{audit, Accepted, GateError, InboundNotification};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::{error::ApiError, server::AppState};

/// Response for an accepted notification.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct AcceptedResponse {
    /// Always true for a 200 response
    pub accepted: bool,
    /// Whether the notification had already been processed
    pub duplicate: bool,
}

impl From<&Accepted> for AcceptedResponse {
    fn from(accepted: &Accepted) -> Self {
        Self { accepted: true, duplicate: accepted.is_duplicate() }
    }
}

/// Receives a content-change notification.
///
/// # Errors
///
/// Returns the gate's rejection as an `ApiError`:
/// - 400 `malformed_payload`
/// - 401 `invalid_signature`
/// - 413 `payload_too_large`
/// - 502 `downstream_timeout` / `downstream_unavailable`
#[instrument(
    name = "content_change_webhook",
    skip_all,
    fields(
        content_length = headers.get(CONTENT_LENGTH).and_then(|v| v.to_str().ok()).unwrap_or("unknown"),
    )
)]
pub async fn content_change_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<AcceptedResponse>, ApiError> {
    let body = body.map_err(|rejection| {
        let error = body_rejection(&rejection, &headers, state.gate.config().max_payload_bytes);
        audit::rejected(&error, declared_length(&headers).unwrap_or_default());
        ApiError(error)
    })?;

    let accepted = state.gate.handle_notification(InboundNotification::new(headers, body)).await?;
    debug!(document_id = %accepted.document_id(), duplicate = accepted.is_duplicate(), "notification accepted");

    Ok(Json(AcceptedResponse::from(&accepted)))
}

fn body_rejection(rejection: &BytesRejection, headers: &HeaderMap, limit_bytes: usize) -> GateError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        let size_bytes = declared_length(headers).unwrap_or(limit_bytes.saturating_add(1));
        GateError::PayloadTooLarge { size_bytes, limit_bytes }
    } else {
        GateError::malformed("payload could not be read")
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}
