//! Structured audit trail for every terminal gate outcome.
//!
//! Records go to the `content_gate::audit` target so they can be routed
//! separately from operational logs. Fields are limited to identifiers
//! and sizes: headers, payloads, signatures and secrets are never recorded.

use tracing::{info, warn};

use crate::{
    error::GateError,
    models::{SignatureDigest, VerifiedEvent},
    replay::ReplayGuardEntry,
};

/// Tracing target for audit records.
pub const AUDIT_TARGET: &str = "content_gate::audit";

/// Records a newly accepted and emitted change.
pub fn emitted(event: &VerifiedEvent, digest: &SignatureDigest, payload_size: usize) {
    info!(
        target: AUDIT_TARGET,
        outcome = "emitted",
        document_id = %event.document_id(),
        change_type = %event.change_type(),
        digest = %digest.short(),
        payload_size,
        "content change accepted"
    );
}

/// Records a redelivery suppressed by the replay guard.
pub fn duplicate(entry: &ReplayGuardEntry, payload_size: usize) {
    info!(
        target: AUDIT_TARGET,
        outcome = "duplicate",
        document_id = %entry.document_id,
        digest = %entry.digest.short(),
        first_seen_at = %entry.first_seen_at,
        payload_size,
        "content change already processed"
    );
}

/// Records a rejected notification.
pub fn rejected(error: &GateError, payload_size: usize) {
    warn!(
        target: AUDIT_TARGET,
        outcome = "rejected",
        reason = error.reason_code(),
        retryable = error.is_retryable(),
        payload_size,
        detail = %error,
        "content change rejected"
    );
}
