//! Bounded, time-windowed deduplication of accepted deliveries.
//!
//! The guard maps each `SignatureDigest` to a slot. A slot is either
//! *in flight* (a request holds a `Reservation` and is emitting) or
//! *committed* (the emit succeeded at `first_seen`). At most one request
//! can hold the reservation for a digest; concurrent deliveries of the
//! same digest wait for the holder and then either observe the committed
//! entry (duplicate) or take over the reservation if the holder gave up.
//!
//! Committed entries expire after the retention window and are evicted
//! oldest-first once `max_entries` is exceeded. The table lock is never
//! held across an `.await`.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{GateError, Result},
    models::{DocumentId, SignatureDigest},
    time::Clock,
};

/// Replay guard sizing and retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuardConfig {
    /// How long a committed entry suppresses redelivery.
    pub retention: Duration,
    /// Maximum number of committed entries kept.
    pub max_entries: usize,
}

impl Default for ReplayGuardConfig {
    fn default() -> Self {
        Self { retention: Duration::from_secs(24 * 60 * 60), max_entries: 100_000 }
    }
}

impl ReplayGuardConfig {
    /// Checks that the guard can hold at least one entry for a nonzero
    /// window.
    ///
    /// # Errors
    ///
    /// Returns `GateError::Configuration` for a zero retention or a zero
    /// capacity, either of which would forget every delivery on commit.
    pub fn validate(&self) -> Result<()> {
        if self.retention.is_zero() {
            return Err(GateError::Configuration("replay retention must be greater than 0".into()));
        }
        if self.max_entries == 0 {
            return Err(GateError::Configuration("replay capacity must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Record of an accepted delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayGuardEntry {
    /// Document the delivery referred to
    pub document_id: DocumentId,
    /// Digest of the (signature, payload) pair
    pub digest: SignatureDigest,
    /// When the delivery was first accepted
    pub first_seen_at: DateTime<Utc>,
}

/// Outcome of asking the guard to admit a digest.
#[derive(Debug)]
pub enum Admission<'a> {
    /// No live entry exists; the caller holds the reservation.
    Fresh(Reservation<'a>),
    /// The digest was already accepted within the retention window.
    Duplicate(ReplayGuardEntry),
}

#[derive(Debug)]
enum Slot {
    InFlight { ticket: u64, done: watch::Receiver<bool> },
    Committed { entry: ReplayGuardEntry, seen: Instant },
}

#[derive(Debug, Default)]
struct Table {
    slots: HashMap<SignatureDigest, Slot>,
    // Commit order; may hold stale records for digests that were since
    // expired or re-committed. Those are skipped when popped.
    order: VecDeque<(SignatureDigest, Instant)>,
    committed: usize,
    next_ticket: u64,
}

impl Table {
    fn remove_committed_if(&mut self, digest: &SignatureDigest, seen_at: Instant) -> bool {
        let matches = matches!(
            self.slots.get(digest),
            Some(Slot::Committed { seen, .. }) if *seen == seen_at
        );
        if matches {
            self.slots.remove(digest);
            self.committed -= 1;
        }
        matches
    }
}

enum Step<'a> {
    Admitted(Admission<'a>),
    Wait(watch::Receiver<bool>),
}

/// Shared deduplication table for accepted deliveries.
#[derive(Debug)]
pub struct ReplayGuard {
    table: Mutex<Table>,
    config: ReplayGuardConfig,
    clock: Arc<dyn Clock>,
}

impl ReplayGuard {
    /// Creates an empty guard.
    pub fn new(config: ReplayGuardConfig, clock: Arc<dyn Clock>) -> Self {
        Self { table: Mutex::new(Table::default()), config, clock }
    }

    /// Returns the guard configuration.
    pub fn config(&self) -> ReplayGuardConfig {
        self.config
    }

    /// Admits a digest, waiting while another request holds its reservation.
    pub async fn admit(&self, digest: SignatureDigest, document_id: &DocumentId) -> Admission<'_> {
        loop {
            match self.try_admit(digest, document_id) {
                Step::Admitted(admission) => return admission,
                Step::Wait(mut done) => {
                    debug!(digest = %digest.short(), "identical delivery in flight, waiting");
                    // Err means the holder dropped its reservation; re-check either way.
                    let _ = done.wait_for(|committed| *committed).await;
                },
            }
        }
    }

    fn try_admit(&self, digest: SignatureDigest, document_id: &DocumentId) -> Step<'_> {
        let now = self.clock.now();
        let mut table = self.lock();

        match table.slots.get(&digest) {
            Some(Slot::InFlight { done, .. }) => return Step::Wait(done.clone()),
            Some(Slot::Committed { entry, seen }) => {
                if now.saturating_duration_since(*seen) < self.config.retention {
                    return Step::Admitted(Admission::Duplicate(entry.clone()));
                }
                let seen = *seen;
                table.remove_committed_if(&digest, seen);
            },
            None => {},
        }

        let ticket = table.next_ticket;
        table.next_ticket = table.next_ticket.wrapping_add(1);
        let (sender, done) = watch::channel(false);
        table.slots.insert(digest, Slot::InFlight { ticket, done });

        Step::Admitted(Admission::Fresh(Reservation {
            guard: self,
            digest,
            document_id: document_id.clone(),
            ticket,
            sender: Some(sender),
        }))
    }

    fn commit(&self, digest: SignatureDigest, ticket: u64, document_id: DocumentId) -> ReplayGuardEntry {
        let seen = self.clock.now();
        let entry = ReplayGuardEntry { document_id, digest, first_seen_at: self.clock.now_utc() };
        let mut table = self.lock();

        let holds_ticket =
            matches!(table.slots.get(&digest), Some(Slot::InFlight { ticket: t, .. }) if *t == ticket);
        if holds_ticket {
            table.slots.insert(digest, Slot::Committed { entry: entry.clone(), seen });
            table.order.push_back((digest, seen));
            table.committed += 1;
            self.evict_over_capacity(&mut table);
        }
        entry
    }

    fn release(&self, digest: SignatureDigest, ticket: u64) {
        let mut table = self.lock();
        let holds_ticket =
            matches!(table.slots.get(&digest), Some(Slot::InFlight { ticket: t, .. }) if *t == ticket);
        if holds_ticket {
            table.slots.remove(&digest);
        }
    }

    fn evict_over_capacity(&self, table: &mut Table) {
        while table.committed > self.config.max_entries {
            let Some((digest, seen)) = table.order.pop_front() else { break };
            if table.remove_committed_if(&digest, seen) {
                debug!(digest = %digest.short(), "replay guard at capacity, evicted oldest entry");
            }
        }
    }

    /// Removes committed entries older than the retention window.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.lock();
        let mut removed = 0;

        while let Some(&(digest, seen)) = table.order.front() {
            if now.saturating_duration_since(seen) < self.config.retention {
                break;
            }
            table.order.pop_front();
            if table.remove_committed_if(&digest, seen) {
                removed += 1;
            }
        }
        removed
    }

    /// Returns whether a live committed entry exists for `digest`.
    pub fn contains(&self, digest: &SignatureDigest) -> bool {
        let now = self.clock.now();
        matches!(
            self.lock().slots.get(digest),
            Some(Slot::Committed { seen, .. })
                if now.saturating_duration_since(*seen) < self.config.retention
        )
    }

    /// Number of committed entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().committed
    }

    /// Returns whether the guard holds no committed entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawns a task that purges expired entries every `interval` until
    /// `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "replay guard sweeper started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    () = self.clock.sleep(interval) => {
                        let removed = self.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = self.len(), "purged expired replay guard entries");
                        }
                    },
                }
            }
            info!("replay guard sweeper stopped");
        })
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        // Table updates are single statements; a poisoned lock still holds
        // a consistent table.
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Exclusive claim on a digest while its event is being emitted.
///
/// Dropping a reservation without committing releases the digest so a
/// redelivery is processed as new, and wakes any waiting duplicates.
#[derive(Debug)]
pub struct Reservation<'a> {
    guard: &'a ReplayGuard,
    digest: SignatureDigest,
    document_id: DocumentId,
    ticket: u64,
    sender: Option<watch::Sender<bool>>,
}

impl Reservation<'_> {
    /// Records the delivery as accepted and wakes waiting duplicates.
    pub fn commit(mut self) -> ReplayGuardEntry {
        let entry = self.guard.commit(self.digest, self.ticket, self.document_id.clone());
        if let Some(sender) = self.sender.take() {
            sender.send_replace(true);
        }
        entry
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            self.guard.release(self.digest, self.ticket);
            drop(sender);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TestClock;

    fn guard(retention_secs: u64, max_entries: usize) -> (Arc<ReplayGuard>, TestClock) {
        let clock = TestClock::new();
        let config = ReplayGuardConfig { retention: Duration::from_secs(retention_secs), max_entries };
        (Arc::new(ReplayGuard::new(config, Arc::new(clock.clone()))), clock)
    }

    fn digest(n: u8) -> SignatureDigest {
        SignatureDigest::compute(&[n], b"payload")
    }

    fn doc() -> DocumentId {
        DocumentId::new("doc-1").unwrap()
    }

    #[tokio::test]
    async fn committed_digest_is_duplicate_within_window() {
        let (guard, _clock) = guard(60, 10);

        let Admission::Fresh(reservation) = guard.admit(digest(1), &doc()).await else {
            panic!("first admission must be fresh");
        };
        let entry = reservation.commit();

        match guard.admit(digest(1), &doc()).await {
            Admission::Duplicate(existing) => assert_eq!(existing, entry),
            Admission::Fresh(_) => panic!("second admission must be a duplicate"),
        }
        assert!(guard.contains(&digest(1)));
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test]
    async fn expired_entry_admits_again() {
        let (guard, clock) = guard(60, 10);
        if let Admission::Fresh(reservation) = guard.admit(digest(1), &doc()).await {
            reservation.commit();
        }

        clock.advance(Duration::from_secs(60));

        assert!(!guard.contains(&digest(1)));
        assert!(matches!(guard.admit(digest(1), &doc()).await, Admission::Fresh(_)));
    }

    #[tokio::test]
    async fn dropped_reservation_releases_digest() {
        let (guard, _clock) = guard(60, 10);

        let first = guard.admit(digest(1), &doc()).await;
        assert!(matches!(first, Admission::Fresh(_)));
        drop(first);

        assert!(matches!(guard.admit(digest(1), &doc()).await, Admission::Fresh(_)));
        assert!(guard.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_oldest_entry() {
        let (guard, clock) = guard(3600, 2);
        for n in 1..=3 {
            if let Admission::Fresh(reservation) = guard.admit(digest(n), &doc()).await {
                reservation.commit();
            }
            clock.advance(Duration::from_secs(1));
        }

        assert_eq!(guard.len(), 2);
        assert!(!guard.contains(&digest(1)));
        assert!(guard.contains(&digest(2)));
        assert!(guard.contains(&digest(3)));
    }

    #[tokio::test]
    async fn purge_removes_only_expired_entries() {
        let (guard, clock) = guard(10, 10);
        if let Admission::Fresh(reservation) = guard.admit(digest(1), &doc()).await {
            reservation.commit();
        }
        clock.advance(Duration::from_secs(5));
        if let Admission::Fresh(reservation) = guard.admit(digest(2), &doc()).await {
            reservation.commit();
        }
        clock.advance(Duration::from_secs(6));

        assert_eq!(guard.purge_expired(), 1);
        assert_eq!(guard.len(), 1);
        assert!(guard.contains(&digest(2)));
    }

    #[tokio::test]
    async fn waiter_sees_commit_as_duplicate() {
        let (guard, _clock) = guard(60, 10);
        let Admission::Fresh(reservation) = guard.admit(digest(1), &doc()).await else {
            panic!("first admission must be fresh");
        };

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move {
                matches!(guard.admit(digest(1), &doc()).await, Admission::Duplicate(_))
            })
        };
        tokio::task::yield_now().await;
        reservation.commit();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn waiter_takes_over_released_reservation() {
        let (guard, _clock) = guard(60, 10);
        let first = guard.admit(digest(1), &doc()).await;

        let waiter = {
            let guard = guard.clone();
            tokio::spawn(async move {
                match guard.admit(digest(1), &doc()).await {
                    Admission::Fresh(reservation) => {
                        reservation.commit();
                        true
                    },
                    Admission::Duplicate(_) => false,
                }
            })
        };
        tokio::task::yield_now().await;
        drop(first);

        assert!(waiter.await.unwrap());
        assert!(guard.contains(&digest(1)));
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancellation() {
        let (guard, _clock) = guard(60, 10);
        let shutdown = CancellationToken::new();
        let handle = guard.clone().spawn_sweeper(Duration::from_secs(1), shutdown.clone());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
