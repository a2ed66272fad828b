//! Domain models for content-change notifications.
//!
//! Newtype wrappers keep document ids and digests from being mixed with
//! arbitrary strings. `VerifiedEvent` can only be built inside this crate,
//! after the gate has checked the payload signature.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{GateError, Result};

/// Identifier of a document in the content source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document id, rejecting blank values.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(GateError::malformed("documentId must not be empty"));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of change the content source reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    /// Document was created
    Created,
    /// Document was updated
    Updated,
    /// Document was deleted
    Deleted,
}

impl ChangeType {
    /// All accepted change types.
    pub const ALL: [Self; 3] = [Self::Created, Self::Updated, Self::Deleted];

    /// Returns the wire name of the change type.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeType {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            _ => Err(GateError::malformed("unsupported changeType")),
        }
    }
}

/// The fields the gate needs from a notification payload.
///
/// Any other fields in the payload are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// Changed document
    pub document_id: DocumentId,
    /// What happened to it
    pub change_type: ChangeType,
}

impl ContentChange {
    /// Parses a raw notification payload.
    ///
    /// The payload must be a JSON object with a non-empty string
    /// `documentId` (or `_id`) and a `changeType` of `created`, `updated`
    /// or `deleted`.
    ///
    /// # Errors
    ///
    /// Returns `GateError::MalformedPayload` with a static reason. The
    /// reason never echoes payload content.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.is_empty() {
            return Err(GateError::malformed("payload is empty"));
        }

        let object: Map<String, Value> = serde_json::from_slice(payload)
            .map_err(|_| GateError::malformed("payload is not a JSON object"))?;

        let document_id = object
            .get("documentId")
            .or_else(|| object.get("_id"))
            .ok_or(GateError::malformed("missing documentId"))?
            .as_str()
            .ok_or(GateError::malformed("documentId must be a string"))?;

        let change_type = object
            .get("changeType")
            .ok_or(GateError::malformed("missing changeType"))?
            .as_str()
            .ok_or(GateError::malformed("changeType must be a string"))?
            .parse()?;

        Ok(Self { document_id: DocumentId::new(document_id)?, change_type })
    }
}

/// SHA-256 digest identifying one (signature, payload) delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignatureDigest([u8; 32]);

impl SignatureDigest {
    /// Digests the decoded signature tag together with the payload.
    ///
    /// The tag is length-prefixed so tag and payload bytes cannot be
    /// shifted across the boundary.
    pub fn compute(tag: &[u8], payload: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((tag.len() as u64).to_be_bytes());
        hasher.update(tag);
        hasher.update(payload);
        Self(hasher.finalize().into())
    }

    /// Returns the first 12 hex characters, for log correlation.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for SignatureDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A content change whose signature has been verified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedEvent {
    document_id: DocumentId,
    change_type: ChangeType,
    received_at: DateTime<Utc>,
}

impl VerifiedEvent {
    pub(crate) fn new(change: ContentChange, received_at: DateTime<Utc>) -> Self {
        Self { document_id: change.document_id, change_type: change.change_type, received_at }
    }

    /// Changed document.
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// What happened to the document.
    pub fn change_type(&self) -> ChangeType {
        self.change_type
    }

    /// When the gate received the notification.
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Always true: instances only exist after verification.
    pub const fn signature_valid(&self) -> bool {
        true
    }
}
