//! The webhook intake gate.
//!
//! Each notification moves through:
//!
//! ```text
//! Received ─▶ PayloadValidated ─▶ SignatureChecked ─▶ DeduplicationChecked ─▶ Emitted
//!    │               │                   │                     │
//!    └───────────────┴───────────────────┴─────────────────────┴──▶ Rejected(reason)
//! ```
//!
//! The payload shape is checked before the signature so a malformed body
//! is reported as malformed whatever its signature. Nothing is emitted
//! until the signature has been verified.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use http::HeaderMap;
use tracing::{debug, instrument, warn};

use crate::{
    audit,
    crypto::SignatureVerifier,
    error::{GateError, Result},
    invalidation::CacheInvalidator,
    models::{ContentChange, DocumentId, SignatureDigest, VerifiedEvent},
    replay::{Admission, ReplayGuard, ReplayGuardEntry},
    time::Clock,
};

/// Default payload limit: 1 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Default bound on a single downstream invalidation.
pub const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request limits enforced by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Largest accepted payload in bytes.
    pub max_payload_bytes: usize,
    /// Deadline for the downstream invalidation call.
    pub emit_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self { max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES, emit_timeout: DEFAULT_EMIT_TIMEOUT }
    }
}

/// Raw notification as received over HTTP.
#[derive(Debug, Clone)]
pub struct InboundNotification {
    /// Request headers
    pub headers: HeaderMap,
    /// Unparsed request body
    pub payload: Bytes,
}

impl InboundNotification {
    /// Creates a notification from headers and body.
    pub fn new(headers: HeaderMap, payload: impl Into<Bytes>) -> Self {
        Self { headers, payload: payload.into() }
    }
}

/// Successful outcome of handling a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accepted {
    /// First delivery within the retention window; the event was emitted.
    New(VerifiedEvent),
    /// Redelivery of an already processed notification; nothing emitted.
    Duplicate(ReplayGuardEntry),
}

impl Accepted {
    /// Returns whether the notification had already been processed.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }

    /// Document the notification referred to.
    pub fn document_id(&self) -> &DocumentId {
        match self {
            Self::New(event) => event.document_id(),
            Self::Duplicate(entry) => &entry.document_id,
        }
    }
}

/// Authenticates, deduplicates and forwards content-change notifications.
///
/// All collaborators are injected so tests can substitute the clock, the
/// replay guard and the downstream invalidator.
#[derive(Debug)]
pub struct WebhookGate {
    verifier: SignatureVerifier,
    replay: Arc<ReplayGuard>,
    invalidator: Arc<dyn CacheInvalidator>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
}

impl WebhookGate {
    /// Creates a gate.
    ///
    /// A `SignatureVerifier` can only exist with a non-blank secret, so a
    /// gate can never run unauthenticated.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Configuration` for a zero payload limit, a zero
    /// emit timeout, or a replay guard with zero retention or capacity.
    pub fn new(
        verifier: SignatureVerifier,
        replay: Arc<ReplayGuard>,
        invalidator: Arc<dyn CacheInvalidator>,
        clock: Arc<dyn Clock>,
        config: GateConfig,
    ) -> Result<Self> {
        if config.max_payload_bytes == 0 {
            return Err(GateError::Configuration("max payload size must be greater than 0".into()));
        }
        if config.emit_timeout.is_zero() {
            return Err(GateError::Configuration("emit timeout must be greater than 0".into()));
        }
        replay.config().validate()?;
        Ok(Self { verifier, replay, invalidator, clock, config })
    }

    /// Returns the gate limits.
    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Returns the shared replay guard.
    pub fn replay_guard(&self) -> &Arc<ReplayGuard> {
        &self.replay
    }

    /// Returns the header the signature is read from.
    pub fn signature_header(&self) -> &str {
        self.verifier.header().as_str()
    }

    /// Handles one notification end to end.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` above the configured limit
    /// - `MalformedPayload` for empty bodies, non-objects, a missing or
    ///   blank `documentId`, or an unknown `changeType`
    /// - `InvalidSignature` for a missing or mismatching signature
    /// - `DownstreamTimeout` / `DownstreamUnavailable` when invalidation
    ///   fails; the delivery is not recorded, so a redelivery is processed
    ///   as new
    #[instrument(name = "handle_notification", skip_all, fields(payload_size = notification.payload.len()))]
    pub async fn handle_notification(&self, notification: InboundNotification) -> Result<Accepted> {
        let payload_size = notification.payload.len();
        let outcome = self.process(notification).await;

        if let Err(error) = &outcome {
            audit::rejected(error, payload_size);
        }
        outcome
    }

    async fn process(&self, notification: InboundNotification) -> Result<Accepted> {
        let InboundNotification { headers, payload } = notification;

        if payload.len() > self.config.max_payload_bytes {
            return Err(GateError::PayloadTooLarge {
                size_bytes: payload.len(),
                limit_bytes: self.config.max_payload_bytes,
            });
        }

        let change = ContentChange::parse(&payload)?;
        debug!(document_id = %change.document_id, change_type = %change.change_type, "payload validated");

        let tag = self.verifier.verify(&headers, &payload)?;
        let digest = SignatureDigest::compute(&tag, &payload);
        debug!(digest = %digest.short(), "signature verified");

        let reservation = match self.replay.admit(digest, &change.document_id).await {
            Admission::Duplicate(entry) => {
                audit::duplicate(&entry, payload.len());
                return Ok(Accepted::Duplicate(entry));
            },
            Admission::Fresh(reservation) => reservation,
        };

        let event = VerifiedEvent::new(change, self.clock.now_utc());
        self.emit(&event).await?;

        reservation.commit();
        audit::emitted(&event, &digest, payload.len());
        Ok(Accepted::New(event))
    }

    async fn emit(&self, event: &VerifiedEvent) -> Result<()> {
        let timeout = self.config.emit_timeout;
        let call = self.invalidator.invalidate(event.document_id(), event.change_type());

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                warn!(document_id = %event.document_id(), error = %error, "cache invalidation failed");
                Err(GateError::DownstreamUnavailable(error))
            },
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(document_id = %event.document_id(), timeout_ms, "cache invalidation timed out");
                Err(GateError::DownstreamTimeout { timeout_ms })
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::HeaderValue;

    use super::*;
    use crate::{
        crypto::WebhookSecret, error::InvalidationError, models::ChangeType,
        replay::ReplayGuardConfig, time::TestClock,
    };

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CacheInvalidator for Counting {
        async fn invalidate(
            &self,
            _document_id: &DocumentId,
            _change_type: ChangeType,
        ) -> std::result::Result<(), InvalidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn gate(invalidator: Arc<dyn CacheInvalidator>) -> WebhookGate {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
        let verifier =
            SignatureVerifier::new(WebhookSecret::new("gate-unit-secret").unwrap(), "x-signature")
                .unwrap();
        let replay = Arc::new(ReplayGuard::new(ReplayGuardConfig::default(), clock.clone()));
        WebhookGate::new(verifier, replay, invalidator, clock, GateConfig::default()).unwrap()
    }

    fn signed(gate: &WebhookGate, payload: &'static [u8]) -> InboundNotification {
        let mut headers = HeaderMap::new();
        let signature = gate.verifier.sign(payload).unwrap();
        headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());
        InboundNotification::new(headers, payload)
    }

    #[tokio::test]
    async fn accepts_then_deduplicates() {
        let counting = Arc::new(Counting::default());
        let gate = gate(counting.clone());
        let payload: &[u8] = br#"{"documentId":"hero","changeType":"updated"}"#;

        let first = gate.handle_notification(signed(&gate, payload)).await.unwrap();
        let second = gate.handle_notification(signed(&gate, payload)).await.unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(second.document_id().as_str(), "hero");
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsigned_notification_is_rejected() {
        let counting = Arc::new(Counting::default());
        let gate = gate(counting.clone());
        let notification = InboundNotification::new(
            HeaderMap::new(),
            &br#"{"documentId":"hero","changeType":"updated"}"#[..],
        );

        let err = gate.handle_notification(notification).await.unwrap_err();
        assert!(matches!(err, GateError::InvalidSignature));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn zero_limits_are_configuration_errors() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
        let verifier =
            SignatureVerifier::new(WebhookSecret::new("s").unwrap(), "x-signature").unwrap();
        let replay = Arc::new(ReplayGuard::new(ReplayGuardConfig::default(), clock.clone()));
        let config = GateConfig { max_payload_bytes: 0, ..GateConfig::default() };

        let err = WebhookGate::new(verifier, replay, Arc::new(Counting::default()), clock, config)
            .unwrap_err();
        assert_eq!(err.reason_code(), "configuration_error");
    }

    #[test]
    fn replay_guard_that_forgets_on_commit_is_rejected() {
        let clock: Arc<dyn Clock> = Arc::new(TestClock::new());
        let unusable = [
            ReplayGuardConfig { max_entries: 0, ..ReplayGuardConfig::default() },
            ReplayGuardConfig { retention: Duration::ZERO, ..ReplayGuardConfig::default() },
        ];

        for replay_config in unusable {
            let verifier =
                SignatureVerifier::new(WebhookSecret::new("s").unwrap(), "x-signature").unwrap();
            let replay = Arc::new(ReplayGuard::new(replay_config, clock.clone()));

            let err = WebhookGate::new(
                verifier,
                replay,
                Arc::new(Counting::default()),
                clock.clone(),
                GateConfig::default(),
            )
            .unwrap_err();
            assert_eq!(err.reason_code(), "configuration_error", "{replay_config:?}");
        }
    }
}
