//! HTTP request handlers for the content gate.
//!
//! - `content_change` - the signed webhook intake
//! - `health` - health, readiness and liveness probes
//!
//! Rejections are rendered by `ApiError` as `{"error": "<reason_code>"}`.

pub mod content_change;
pub mod health;

pub use content_change::content_change_webhook;
pub use health::{health_check, liveness_check, readiness_check};
