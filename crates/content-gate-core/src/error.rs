//! Error taxonomy for the webhook intake path.
//!
//! Every rejection carries a stable reason code that is safe to return to
//! the sender. Display output never contains secret material or payload
//! content, so errors can be logged as-is.

use thiserror::Error;

/// Result type alias using `GateError`.
pub type Result<T> = std::result::Result<T, GateError>;

/// Errors produced while handling an inbound content-change notification.
#[derive(Debug, Error)]
pub enum GateError {
    /// The gate cannot operate with the configured settings. Raised at
    /// startup, never per request.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Signature header missing, undecodable or not matching the payload.
    #[error("invalid signature")]
    InvalidSignature,

    /// Payload is not a JSON object with a document id and known change type.
    #[error("malformed payload: {reason}")]
    MalformedPayload {
        /// Static description of what was wrong.
        reason: &'static str,
    },

    /// Payload exceeds the configured limit.
    #[error("payload too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    PayloadTooLarge {
        /// Size of the rejected payload in bytes
        size_bytes: usize,
        /// Configured maximum in bytes
        limit_bytes: usize,
    },

    /// Cache invalidation did not finish within the emit timeout.
    #[error("downstream timeout: invalidation exceeded {timeout_ms}ms")]
    DownstreamTimeout {
        /// Timeout that was exceeded in milliseconds
        timeout_ms: u64,
    },

    /// Cache invalidation failed.
    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(#[from] InvalidationError),
}

impl GateError {
    /// Creates a malformed payload error.
    pub const fn malformed(reason: &'static str) -> Self {
        Self::MalformedPayload { reason }
    }

    /// Returns the stable reason code reported to callers.
    pub const fn reason_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::DownstreamTimeout { .. } => "downstream_timeout",
            Self::DownstreamUnavailable(_) => "downstream_unavailable",
        }
    }

    /// Returns whether the sender may usefully redeliver.
    ///
    /// Only downstream failures qualify: the replay guard entry is not
    /// committed for them, so redelivery is processed as new.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DownstreamTimeout { .. } | Self::DownstreamUnavailable(_))
    }
}

/// Errors reported by a cache invalidation consumer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidationError {
    /// The consumer did not answer in time.
    #[error("invalidation timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that was exceeded in milliseconds
        timeout_ms: u64,
    },

    /// The consumer answered with a non-success status.
    #[error("invalidation rejected with HTTP {status}")]
    Rejected {
        /// HTTP status code returned by the consumer
        status: u16,
    },

    /// Transport-level failure reaching the consumer.
    #[error("invalidation transport failed: {0}")]
    Network(String),
}
