//! Sync coordinator: drives one pull → reconcile → push → retry →
//! checkpoint cycle end-to-end
//!
//! At most one cycle runs at a time. The cycle lock is the single
//! concurrency-sensitive boundary of the engine; UI writes to the local
//! store happen concurrently under the store's own atomicity, which is why
//! the dirty set is read at push time rather than snapshotted at cycle
//! start.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{ConflictWinner, SyncConflict};
use crate::remote::RemoteStore;
use crate::store::LocalStore;

use super::checkpoint::SyncCheckpoint;
use super::clock::Clock;
use super::error::{SyncError, SyncResult};
use super::record::{Collection, SyncRecord};
use super::resolver::{resolve, Resolution};
use super::retry::{OperationKind, PendingOperation, RetryDisposition, RetryQueue};
use super::tracker::ChangeTracker;

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retry budget per operation before it fails terminally
    pub max_attempts: u32,
    /// First retry backoff interval
    pub backoff_base: Duration,
    /// Ceiling for the backoff interval
    pub backoff_cap: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(300),
        }
    }
}

/// Coordinator-level state visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle in flight
    Idle,
    /// A cycle is running
    Syncing,
}

/// Snapshot returned by [`SyncCoordinator::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Idle or syncing
    pub state: SyncState,
    /// Pull watermark per collection (Unix ms; 0 = never synced)
    pub last_synced: Vec<(Collection, i64)>,
    /// Operations waiting in the retry queue
    pub pending_retries: usize,
    /// Operations that exhausted retries and need caller attention
    pub terminal_failures: usize,
}

/// A record-level push that will not be retried automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalFailure {
    /// Collection of the failed record
    pub collection: Collection,
    /// Record that failed
    pub entity_id: Uuid,
    /// Upsert or delete
    pub kind: OperationKind,
    /// Why it failed
    pub error: String,
}

/// A collection whose pull did not complete this cycle. Its watermark was
/// not advanced; the next cycle re-pulls from the same point, resuming at
/// the last completed page. Its dirty set is withheld from the push phase
/// until a pull completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullFailure {
    /// Collection whose pull failed
    pub collection: Collection,
    /// Why it failed
    pub error: String,
}

/// Why a cycle stopped before completing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Credentials expired; the caller must re-authenticate, after which the
    /// next cycle resumes cleanly
    AuthExpired,
    /// The local store failed; nothing was checkpointed past the failure
    Storage(String),
}

/// What one sync cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Remote records observed during pull
    pub pulled: usize,
    /// Remote records applied to the local store
    pub applied: usize,
    /// Local records confirmed accepted by the remote
    pub pushed: usize,
    /// Pushes handed to the retry queue
    pub deferred: usize,
    /// Collections whose pull was interrupted
    pub pull_failures: Vec<PullFailure>,
    /// Record-level terminal failures from this cycle
    pub failures: Vec<TerminalFailure>,
    /// Set when the cycle stopped early
    pub aborted: Option<AbortReason>,
}

impl SyncOutcome {
    /// Whether the cycle completed with nothing left behind.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.aborted.is_none()
            && self.pull_failures.is_empty()
            && self.failures.is_empty()
            && self.deferred == 0
    }
}

/// Orchestrates sync cycles against one local and one remote store.
///
/// Collaborators and the clock are injected; the coordinator owns all
/// sync-internal state (retry queue, checkpoints via the store) and nothing
/// else mutates it.
pub struct SyncCoordinator<L, R, C> {
    local: Arc<L>,
    remote: R,
    clock: C,
    tracker: ChangeTracker<L>,
    /// Single-permit cycle lock; the retry queue lives inside it since only
    /// the running cycle may touch it.
    cycle: Mutex<RetryQueue>,
    /// Completed-cycle counter backing the collapse of concurrent requests.
    generation: AtomicU64,
    last_outcome: std::sync::Mutex<Option<SyncOutcome>>,
    syncing: AtomicBool,
    pending_retries: AtomicUsize,
    terminal_count: AtomicUsize,
}

impl<L, R, C> SyncCoordinator<L, R, C>
where
    L: LocalStore,
    R: RemoteStore,
    C: Clock,
{
    /// Create a coordinator over the given collaborators.
    pub fn new(local: Arc<L>, remote: R, clock: C, config: SyncConfig) -> Self {
        let tracker = ChangeTracker::new(Arc::clone(&local));
        let retry = RetryQueue::new(config.backoff_base, config.backoff_cap, config.max_attempts);
        Self {
            local,
            remote,
            clock,
            tracker,
            cycle: Mutex::new(retry),
            generation: AtomicU64::new(0),
            last_outcome: std::sync::Mutex::new(None),
            syncing: AtomicBool::new(false),
            pending_retries: AtomicUsize::new(0),
            terminal_count: AtomicUsize::new(0),
        }
    }

    /// Run one sync cycle, or collapse into the cycle already in flight.
    ///
    /// Safe to call concurrently: a request that arrives while a cycle runs
    /// waits for it and returns that cycle's outcome instead of starting a
    /// second one.
    pub async fn request_sync(&self) -> SyncOutcome {
        let seen = self.generation.load(Ordering::Acquire);
        let mut retry = self.cycle.lock().await;
        if self.generation.load(Ordering::Acquire) != seen {
            // A full cycle completed while we waited for the lock.
            let collapsed = self
                .last_outcome
                .lock()
                .ok()
                .and_then(|outcome| outcome.clone());
            if let Some(outcome) = collapsed {
                tracing::debug!("Sync request collapsed into just-finished cycle");
                return outcome;
            }
        }

        self.syncing.store(true, Ordering::Release);
        let outcome = self.run_cycle(&mut retry).await;
        self.syncing.store(false, Ordering::Release);

        self.pending_retries
            .store(retry.pending_count(), Ordering::Release);
        self.terminal_count
            .store(retry.terminal_failures().len(), Ordering::Release);
        if let Ok(mut guard) = self.last_outcome.lock() {
            *guard = Some(outcome.clone());
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Current engine state for the calling layer's "syncing / pending: N /
    /// last synced: T" display.
    pub fn status(&self) -> crate::Result<SyncStatus> {
        let state = if self.syncing.load(Ordering::Acquire) {
            SyncState::Syncing
        } else {
            SyncState::Idle
        };
        let mut last_synced = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let checkpoint = self.local.load_checkpoint(collection)?;
            last_synced.push((collection, checkpoint.last_synced_at));
        }
        Ok(SyncStatus {
            state,
            last_synced,
            pending_retries: self.pending_retries.load(Ordering::Acquire),
            terminal_failures: self.terminal_count.load(Ordering::Acquire),
        })
    }

    /// Put terminally failed operations back in play after the caller fixed
    /// the offending records. Returns how many were re-queued.
    pub async fn reattempt_failed(&self) -> usize {
        let mut retry = self.cycle.lock().await;
        let count = retry.reset_terminal(self.clock.now_millis());
        self.pending_retries
            .store(retry.pending_count(), Ordering::Release);
        self.terminal_count
            .store(retry.terminal_failures().len(), Ordering::Release);
        count
    }

    /// Drive timer-triggered cycles until the task is dropped. The first
    /// cycle runs immediately.
    pub async fn run_periodic(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcome = self.request_sync().await;
            if let Some(reason) = &outcome.aborted {
                tracing::warn!(?reason, "Periodic sync cycle aborted");
            }
        }
    }

    async fn run_cycle(&self, retry: &mut RetryQueue) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();
        tracing::info!("Sync cycle started");

        // Pull before push, per collection: remote state is reconciled into
        // the local store first so a losing local edit is discarded instead
        // of being pushed over a newer remote value.
        for collection in Collection::ALL {
            match self.pull_collection(collection, &mut outcome).await {
                Ok(()) => {}
                Err(SyncError::AuthExpired) => {
                    tracing::warn!("Sync cycle paused: authentication expired");
                    outcome.aborted = Some(AbortReason::AuthExpired);
                    return outcome;
                }
                Err(SyncError::Storage(error)) => {
                    tracing::error!(%error, "Sync cycle aborted: local storage failure");
                    outcome.aborted = Some(AbortReason::Storage(error.to_string()));
                    return outcome;
                }
                Err(error) => {
                    // Checkpoint stays put; the next cycle re-pulls this
                    // collection from the same point.
                    tracing::warn!(%collection, %error, "Pull interrupted; continuing with remaining collections");
                    outcome.pull_failures.push(PullFailure {
                        collection,
                        error: error.to_string(),
                    });
                }
            }
        }

        for collection in Collection::ALL {
            if outcome
                .pull_failures
                .iter()
                .any(|failure| failure.collection == collection)
            {
                // Pull-then-push ordering holds per collection: without a
                // completed pull the resolver has not seen the remote side,
                // so this collection's dirty set waits for the next cycle.
                tracing::debug!(%collection, "Push withheld after interrupted pull");
                continue;
            }
            if let Err(reason) = self.push_collection(collection, retry, &mut outcome).await {
                outcome.aborted = Some(reason);
                return outcome;
            }
        }

        if let Err(reason) = self.drain_retries(retry, &mut outcome).await {
            outcome.aborted = Some(reason);
            return outcome;
        }

        tracing::info!(
            pulled = outcome.pulled,
            applied = outcome.applied,
            pushed = outcome.pushed,
            deferred = outcome.deferred,
            failures = outcome.failures.len(),
            "Sync cycle finished"
        );
        outcome
    }

    async fn pull_collection(
        &self,
        collection: Collection,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        let checkpoint = self.local.load_checkpoint(collection)?;
        let mut max_seen = checkpoint.last_synced_at;
        let mut page_token = checkpoint.cursor.clone();

        loop {
            let page = match self
                .remote
                .fetch_updated_since(collection, checkpoint.last_synced_at, page_token.as_deref())
                .await
            {
                Ok(page) => page,
                Err(error) => {
                    // The watermark stays put, but completed pages are not
                    // re-fetched: persist the cursor so the next cycle
                    // resumes where this one stopped.
                    if page_token != checkpoint.cursor {
                        self.local.save_checkpoint(
                            collection,
                            &SyncCheckpoint {
                                last_synced_at: checkpoint.last_synced_at,
                                cursor: page_token.clone(),
                            },
                        )?;
                    }
                    return Err(error);
                }
            };
            tracing::debug!(%collection, records = page.records.len(), "Pulled page");

            for remote_record in page.records {
                outcome.pulled += 1;
                max_seen = max_seen.max(remote_record.updated_at);
                let local_record = self.local.get(collection, remote_record.id)?;

                match resolve(local_record.as_ref(), Some(&remote_record)) {
                    Resolution::AcceptRemote => {
                        if let Some(local) = &local_record {
                            if local.needs_sync {
                                // A dirty local edit loses to the newer
                                // remote version; its dirty flag goes away
                                // with the whole-record replace.
                                self.record_conflict(
                                    collection,
                                    local,
                                    &remote_record,
                                    ConflictWinner::Remote,
                                )?;
                            }
                        }
                        if self.local.apply_remote(&remote_record)? {
                            outcome.applied += 1;
                        }
                    }
                    Resolution::KeepLocal => {
                        if let Some(local) = &local_record {
                            let own_echo = local.remote_revision.is_some()
                                && local.remote_revision == remote_record.remote_revision;
                            if local.needs_sync && !own_echo {
                                self.record_conflict(
                                    collection,
                                    local,
                                    &remote_record,
                                    ConflictWinner::Local,
                                )?;
                            }
                        }
                    }
                    Resolution::Noop => {}
                }
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        // Only an uninterrupted full pull advances the watermark.
        let advanced = SyncCheckpoint::at(max_seen);
        if advanced != checkpoint {
            self.local.save_checkpoint(collection, &advanced)?;
            tracing::debug!(%collection, last_synced_at = max_seen, "Checkpoint advanced");
        }
        Ok(())
    }

    async fn push_collection(
        &self,
        collection: Collection,
        retry: &mut RetryQueue,
        outcome: &mut SyncOutcome,
    ) -> Result<(), AbortReason> {
        let dirty = self
            .tracker
            .collect_dirty(collection)
            .map_err(|error| AbortReason::Storage(error.to_string()))?;

        for record in dirty {
            if retry.is_tracked(collection, record.id) {
                // Scheduled with backoff or terminally failed; the retry
                // path owns this record until then.
                continue;
            }
            match self.push_record(&record).await {
                Ok(revision) => {
                    self.tracker
                        .mark_synced(collection, record.id, record.updated_at, revision.as_deref())
                        .map_err(|error| AbortReason::Storage(error.to_string()))?;
                    outcome.pushed += 1;
                }
                Err(SyncError::AuthExpired) => return Err(AbortReason::AuthExpired),
                Err(error) => {
                    self.note_push_failure(&record, retry, error, outcome);
                }
            }
        }
        Ok(())
    }

    async fn drain_retries(
        &self,
        retry: &mut RetryQueue,
        outcome: &mut SyncOutcome,
    ) -> Result<(), AbortReason> {
        let now = self.clock.now_millis();
        for operation in retry.dequeue_ready(now) {
            let record = self
                .local
                .get(operation.collection, operation.entity_id)
                .map_err(|error| AbortReason::Storage(error.to_string()))?;
            let Some(record) = record else {
                // Physically gone (compaction); nothing left to push.
                continue;
            };
            if !record.needs_sync {
                // Confirmed in the meantime, e.g. our value came back in a
                // pull.
                continue;
            }

            match self.push_record(&record).await {
                Ok(revision) => {
                    retry.record_success(&operation);
                    self.tracker
                        .mark_synced(
                            operation.collection,
                            record.id,
                            record.updated_at,
                            revision.as_deref(),
                        )
                        .map_err(|error| AbortReason::Storage(error.to_string()))?;
                    outcome.pushed += 1;
                }
                Err(SyncError::AuthExpired) => {
                    // Cycle-level pause, not a record failure: put the
                    // operation back without burning an attempt.
                    retry.enqueue(operation);
                    return Err(AbortReason::AuthExpired);
                }
                Err(error) => {
                    let failure = error.to_string();
                    match retry.record_failure(operation.clone(), &error, now) {
                        RetryDisposition::Scheduled => outcome.deferred += 1,
                        RetryDisposition::Terminal => outcome.failures.push(TerminalFailure {
                            collection: operation.collection,
                            entity_id: operation.entity_id,
                            kind: operation.kind,
                            error: failure,
                        }),
                    }
                }
            }
        }
        Ok(())
    }

    async fn push_record(&self, record: &SyncRecord) -> SyncResult<Option<String>> {
        if let Some(deleted_at) = record.deleted_at {
            self.remote
                .soft_delete(record.collection, record.id, deleted_at)
                .await?;
            Ok(None)
        } else {
            self.remote.upsert(record).await
        }
    }

    fn note_push_failure(
        &self,
        record: &SyncRecord,
        retry: &mut RetryQueue,
        error: SyncError,
        outcome: &mut SyncOutcome,
    ) {
        let kind = if record.is_tombstone() {
            OperationKind::Delete
        } else {
            OperationKind::Upsert
        };
        let operation = PendingOperation::new(record.collection, record.id, kind);
        let failure = error.to_string();
        match retry.record_failure(operation, &error, self.clock.now_millis()) {
            RetryDisposition::Scheduled => outcome.deferred += 1,
            RetryDisposition::Terminal => outcome.failures.push(TerminalFailure {
                collection: record.collection,
                entity_id: record.id,
                kind,
                error: failure,
            }),
        }
    }

    fn record_conflict(
        &self,
        collection: Collection,
        local: &SyncRecord,
        remote: &SyncRecord,
        winner: ConflictWinner,
    ) -> crate::Result<()> {
        tracing::info!(
            %collection,
            entity_id = %local.id,
            local_updated_at = local.updated_at,
            remote_updated_at = remote.updated_at,
            ?winner,
            "Conflict resolved by last-write-wins"
        );
        self.local.record_conflict(&SyncConflict::new(
            collection,
            local.id,
            local.updated_at,
            remote.updated_at,
            winner,
            self.clock.now_millis(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_a_bounded_retry_budget() {
        let config = SyncConfig::default();
        assert!(config.max_attempts >= 5 && config.max_attempts <= 8);
        assert!(config.backoff_base < config.backoff_cap);
    }

    #[test]
    fn clean_outcome_requires_no_leftovers() {
        let mut outcome = SyncOutcome::default();
        assert!(outcome.is_clean());
        outcome.deferred = 1;
        assert!(!outcome.is_clean());
    }
}
