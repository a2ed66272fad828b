//! Scripted cache invalidator for exercising the gate's downstream paths.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use content_gate_core::{CacheInvalidator, ChangeType, DocumentId, InvalidationError};

/// What the invalidator does on one call.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Acknowledge immediately.
    Ack,
    /// Acknowledge after a real-time delay.
    Delay(Duration),
    /// Fail with the given error.
    Fail(InvalidationError),
    /// Never answer; only the gate's timeout ends the call.
    Stall,
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Behavior>,
    acknowledged: Vec<(DocumentId, ChangeType)>,
    attempts: usize,
}

/// Invalidator that follows a script and records acknowledged calls.
///
/// Once the script is exhausted it falls back to the default behavior,
/// which is `Behavior::Ack` unless configured otherwise.
#[derive(Debug)]
pub struct RecordingInvalidator {
    state: Mutex<State>,
    fallback: Behavior,
}

impl RecordingInvalidator {
    /// Invalidator that acknowledges every call.
    pub fn new() -> Self {
        Self::with_fallback(Behavior::Ack)
    }

    /// Invalidator that behaves as `fallback` on every unscripted call.
    pub fn with_fallback(fallback: Behavior) -> Self {
        Self { state: Mutex::new(State::default()), fallback }
    }

    /// Invalidator that runs `script` in order before falling back to `Ack`.
    pub fn scripted(script: impl IntoIterator<Item = Behavior>) -> Self {
        let invalidator = Self::new();
        invalidator.lock().script.extend(script);
        invalidator
    }

    /// Calls that were acknowledged, in order.
    pub fn acknowledged(&self) -> Vec<(DocumentId, ChangeType)> {
        self.lock().acknowledged.clone()
    }

    /// Number of acknowledged calls.
    pub fn ack_count(&self) -> usize {
        self.lock().acknowledged.len()
    }

    /// Number of calls received, whatever their outcome.
    pub fn attempt_count(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_behavior(&self) -> Behavior {
        let mut state = self.lock();
        state.attempts += 1;
        state.script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }

    fn record(&self, document_id: &DocumentId, change_type: ChangeType) {
        self.lock().acknowledged.push((document_id.clone(), change_type));
    }
}

impl Default for RecordingInvalidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CacheInvalidator for RecordingInvalidator {
    async fn invalidate(
        &self,
        document_id: &DocumentId,
        change_type: ChangeType,
    ) -> Result<(), InvalidationError> {
        match self.next_behavior() {
            Behavior::Ack => {},
            Behavior::Delay(delay) => tokio::time::sleep(delay).await,
            Behavior::Fail(error) => return Err(error),
            Behavior::Stall => std::future::pending::<()>().await,
        }
        self.record(document_id, change_type);
        Ok(())
    }
}
