//! HTTP mapping of gate errors.
//!
//! Error bodies carry only the stable reason code, never the error detail,
//! so nothing about the payload or the secret can leak to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use content_gate_core::GateError;
use serde::Serialize;

/// Error body returned for every rejected request.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Stable reason code
    pub error: &'static str,
}

/// Gate error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GateError);

impl ApiError {
    /// HTTP status for the wrapped error.
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GateError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            GateError::InvalidSignature => StatusCode::UNAUTHORIZED,
            GateError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::DownstreamTimeout { .. } | GateError::DownstreamUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            },
            GateError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GateError> for ApiError {
    fn from(error: GateError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse { error: self.0.reason_code() };
        (self.status(), Json(body)).into_response()
    }
}

/// Response for a request that outlived the HTTP deadline.
///
/// The work was abandoned, so any replay reservation it held has been
/// released and the sender may redeliver.
pub fn deadline_exceeded() -> Response {
    (StatusCode::REQUEST_TIMEOUT, Json(ErrorResponse { error: "request_timeout" })).into_response()
}

#[cfg(test)]
mod tests {
    use content_gate_core::InvalidationError;

    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases = [
            (GateError::malformed("missing documentId"), StatusCode::BAD_REQUEST),
            (GateError::InvalidSignature, StatusCode::UNAUTHORIZED),
            (
                GateError::PayloadTooLarge { size_bytes: 10, limit_bytes: 5 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (GateError::DownstreamTimeout { timeout_ms: 5 }, StatusCode::BAD_GATEWAY),
            (
                GateError::DownstreamUnavailable(InvalidationError::Rejected { status: 500 }),
                StatusCode::BAD_GATEWAY,
            ),
            (GateError::Configuration("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[tokio::test]
    async fn deadline_exceeded_has_a_reason_code() {
        let response = deadline_exceeded();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], br#"{"error":"request_timeout"}"#);
    }
}
