//! Core of the content-change webhook gate.
//!
//! Provides the strongly-typed models, error taxonomy, signature
//! verification, replay guard and the gate that ties them together. The
//! HTTP surface lives in `content-gate-api`; the concrete cache invalidator
//! in `content-gate-invalidator`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod invalidation;
pub mod models;
pub mod replay;
pub mod time;

pub use crypto::{SignatureVerifier, WebhookSecret};
pub use error::{GateError, InvalidationError, Result};
pub use gate::{Accepted, GateConfig, InboundNotification, WebhookGate};
pub use invalidation::{CacheInvalidator, MulticastInvalidator, NoOpInvalidator};
pub use models::{ChangeType, DocumentId, SignatureDigest, VerifiedEvent};
pub use replay::{Admission, ReplayGuard, ReplayGuardConfig, ReplayGuardEntry, Reservation};
pub use time::{Clock, RealClock, TestClock};
