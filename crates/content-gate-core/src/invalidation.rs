//! Downstream cache invalidation contract.
//!
//! The gate hands every newly verified change to a `CacheInvalidator`. The
//! gate bounds each call with its emit timeout and never retries; whether
//! a failed invalidation is redelivered is up to the content source.
//!
//! ```text
//! ┌──────────────┐  invalidate(id, type)  ┌──────────────────────┐
//! │ WebhookGate  │ ──────────────────────▶│ MulticastInvalidator │
//! └──────────────┘                        └──────────────────────┘
//!                                                   │ fan out
//!                                  ┌────────────────┼──────────────┐
//!                                  ▼                ▼              ▼
//!                            HttpInvalidator   edge purge   search reindex
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::{
    error::InvalidationError,
    models::{ChangeType, DocumentId},
};

/// Consumer that invalidates cached content for a changed document.
#[async_trait::async_trait]
pub trait CacheInvalidator: Send + Sync + std::fmt::Debug {
    /// Invalidates everything derived from `document_id`.
    ///
    /// Returning `Ok` acknowledges the change. Implementations should not
    /// retry internally.
    async fn invalidate(
        &self,
        document_id: &DocumentId,
        change_type: ChangeType,
    ) -> Result<(), InvalidationError>;
}

/// Invalidator that acknowledges every change without doing anything.
///
/// Used when no downstream is configured.
#[derive(Debug, Default)]
pub struct NoOpInvalidator;

impl NoOpInvalidator {
    /// Creates a new no-op invalidator.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for NoOpInvalidator {
    async fn invalidate(
        &self,
        document_id: &DocumentId,
        change_type: ChangeType,
    ) -> Result<(), InvalidationError> {
        debug!(document_id = %document_id, change_type = %change_type, "no invalidator configured, acknowledging");
        Ok(())
    }
}

/// Forwards each change to several invalidators concurrently.
///
/// Succeeds only if every subscriber succeeds; the first failure in
/// registration order is reported.
#[derive(Debug, Clone, Default)]
pub struct MulticastInvalidator {
    subscribers: Vec<Arc<dyn CacheInvalidator>>,
}

impl MulticastInvalidator {
    /// Creates a multicast invalidator with no subscribers.
    pub fn new() -> Self {
        Self { subscribers: Vec::new() }
    }

    /// Adds a subscriber.
    pub fn add_subscriber(&mut self, subscriber: Arc<dyn CacheInvalidator>) {
        self.subscribers.push(subscriber);
    }

    /// Returns the number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for MulticastInvalidator {
    async fn invalidate(
        &self,
        document_id: &DocumentId,
        change_type: ChangeType,
    ) -> Result<(), InvalidationError> {
        let calls = self
            .subscribers
            .iter()
            .map(|subscriber| subscriber.invalidate(document_id, change_type));

        futures::future::join_all(calls).await.into_iter().collect()
    }
}
