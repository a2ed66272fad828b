//! Signed notification fixtures and a ready-wired gate.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use content_gate_core::{
    crypto::{sign_payload, DEFAULT_SIGNATURE_HEADER},
    CacheInvalidator, Clock, GateConfig, InboundNotification, ReplayGuard, ReplayGuardConfig,
    SignatureVerifier, TestClock, WebhookGate, WebhookSecret,
};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde_json::json;

use crate::invalidator::RecordingInvalidator;

/// Shared secret used by fixtures. Contains characters outside the hex
/// alphabet so it cannot be mistaken for a signature.
pub const TEST_SECRET: &str = "whsec_Zq8Lr2Vt9KpWmXy";

/// Returns `TEST_SECRET` wrapped as a `WebhookSecret`.
///
/// # Panics
///
/// Never in practice: the constant is non-blank.
#[allow(clippy::expect_used)]
pub fn test_secret() -> WebhookSecret {
    WebhookSecret::new(TEST_SECRET).expect("fixture secret is valid")
}

/// JSON body for a content-change notification.
///
/// `change_type` is passed as a string so tests can send unsupported values.
pub fn change_payload(document_id: &str, change_type: &str) -> Vec<u8> {
    json!({ "documentId": document_id, "changeType": change_type }).to_string().into_bytes()
}

/// Headers carrying a valid hex signature of `payload` under `secret`.
///
/// # Panics
///
/// Panics if signing fails, which only happens for an unusable key.
#[allow(clippy::expect_used)]
pub fn signed_headers(payload: &[u8], secret: &WebhookSecret) -> HeaderMap {
    let signature = sign_payload(payload, secret).expect("fixture secret signs");
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static(DEFAULT_SIGNATURE_HEADER),
        HeaderValue::from_str(&signature).expect("hex is a valid header value"),
    );
    headers
}

/// Notification signed with `TEST_SECRET`.
pub fn signed_notification(payload: impl Into<Bytes>) -> InboundNotification {
    let payload = payload.into();
    InboundNotification::new(signed_headers(&payload, &test_secret()), payload)
}

/// Gate wired to a `TestClock` and a `RecordingInvalidator`.
#[derive(Debug, Clone)]
pub struct GateHarness {
    /// Gate under test
    pub gate: Arc<WebhookGate>,
    /// Clock shared by the gate and its replay guard
    pub clock: TestClock,
    /// Downstream double
    pub invalidator: Arc<RecordingInvalidator>,
}

impl GateHarness {
    /// Harness with default limits and an always-acknowledging invalidator.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts configuring a harness.
    pub fn builder() -> GateHarnessBuilder {
        GateHarnessBuilder::default()
    }

    /// Replay guard behind the gate.
    pub fn replay_guard(&self) -> &Arc<ReplayGuard> {
        self.gate.replay_guard()
    }

    /// Moves the shared clock forward.
    pub fn advance(&self, duration: Duration) {
        self.clock.advance(duration);
    }
}

impl Default for GateHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `GateHarness`.
#[derive(Debug, Default)]
pub struct GateHarnessBuilder {
    gate: GateConfig,
    replay: ReplayGuardConfig,
    invalidator: Option<RecordingInvalidator>,
}

impl GateHarnessBuilder {
    /// Sets the replay retention window.
    #[must_use]
    pub fn retention(mut self, retention: Duration) -> Self {
        self.replay.retention = retention;
        self
    }

    /// Sets the replay capacity.
    #[must_use]
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.replay.max_entries = max_entries;
        self
    }

    /// Sets the payload limit.
    #[must_use]
    pub fn max_payload_bytes(mut self, limit: usize) -> Self {
        self.gate.max_payload_bytes = limit;
        self
    }

    /// Sets the downstream deadline.
    #[must_use]
    pub fn emit_timeout(mut self, timeout: Duration) -> Self {
        self.gate.emit_timeout = timeout;
        self
    }

    /// Uses a preconfigured invalidator.
    #[must_use]
    pub fn invalidator(mut self, invalidator: RecordingInvalidator) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Builds the harness.
    ///
    /// # Panics
    ///
    /// Panics if the configured limits are rejected by the gate.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> GateHarness {
        let clock = TestClock::new();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let invalidator = Arc::new(self.invalidator.unwrap_or_default());
        let verifier = SignatureVerifier::new(test_secret(), DEFAULT_SIGNATURE_HEADER)
            .expect("default header is valid");
        let replay = Arc::new(ReplayGuard::new(self.replay, shared_clock.clone()));
        let downstream: Arc<dyn CacheInvalidator> = invalidator.clone();

        let gate = WebhookGate::new(verifier, replay, downstream, shared_clock, self.gate)
            .expect("harness limits are valid");

        GateHarness { gate: Arc::new(gate), clock, invalidator }
    }
}
