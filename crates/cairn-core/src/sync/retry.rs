//! Retry queue for failed push operations
//!
//! Absorbs transient failures without losing work or blocking the rest of a
//! cycle. Backoff is exponential with a deterministic per-record jitter and
//! a hard attempt ceiling; exhausted or non-retryable operations move to a
//! terminal list that is surfaced to the caller, never silently dropped.

use std::time::Duration;

use uuid::Uuid;

use super::error::SyncError;
use super::record::Collection;

/// What kind of remote write a pending operation re-attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Create-or-update of a live record
    Upsert,
    /// Tombstone propagation
    Delete,
}

/// A push that failed and is waiting for its next attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    /// Collection of the record
    pub collection: Collection,
    /// Record the operation targets
    pub entity_id: Uuid,
    /// Upsert or delete
    pub kind: OperationKind,
    /// Attempts made so far
    pub attempt_count: u32,
    /// Earliest time (Unix ms) the next attempt may run
    pub next_attempt_at: i64,
    /// Message of the most recent failure
    pub last_error: Option<String>,
}

impl PendingOperation {
    /// A fresh operation that has not been attempted through the queue yet.
    #[must_use]
    pub const fn new(collection: Collection, entity_id: Uuid, kind: OperationKind) -> Self {
        Self {
            collection,
            entity_id,
            kind,
            attempt_count: 0,
            next_attempt_at: 0,
            last_error: None,
        }
    }

    fn key(&self) -> (Collection, Uuid, OperationKind) {
        (self.collection, self.entity_id, self.kind)
    }
}

/// Where an operation ended up after a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Re-queued with a backoff window
    Scheduled,
    /// Moved to the terminal list; no further automatic attempts
    Terminal,
}

/// Backoff-scheduled queue of failed pushes, owned by the coordinator.
pub struct RetryQueue {
    pending: Vec<PendingOperation>,
    terminal: Vec<PendingOperation>,
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl RetryQueue {
    /// Create a queue with the given backoff base, ceiling interval, and
    /// attempt budget.
    #[must_use]
    pub const fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            pending: Vec::new(),
            terminal: Vec::new(),
            base,
            cap,
            max_attempts,
        }
    }

    /// Add an operation, replacing any pending entry for the same record and
    /// kind (the latest failure supersedes).
    pub fn enqueue(&mut self, operation: PendingOperation) {
        self.pending.retain(|op| op.key() != operation.key());
        self.pending.push(operation);
    }

    /// Remove and return every operation whose backoff window has elapsed.
    pub fn dequeue_ready(&mut self, now: i64) -> Vec<PendingOperation> {
        let (ready, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|op| op.next_attempt_at <= now);
        self.pending = waiting;
        ready
    }

    /// Record a failed attempt: bump the attempt count and either reschedule
    /// with backoff or, once the budget is exhausted or the error is not
    /// retryable, park the operation in the terminal list.
    pub fn record_failure(
        &mut self,
        mut operation: PendingOperation,
        error: &SyncError,
        now: i64,
    ) -> RetryDisposition {
        operation.attempt_count += 1;
        operation.last_error = Some(error.to_string());

        if !error.is_retryable() || operation.attempt_count >= self.max_attempts {
            tracing::warn!(
                entity_id = %operation.entity_id,
                collection = %operation.collection,
                attempts = operation.attempt_count,
                error = %error,
                "Push failed terminally"
            );
            self.terminal.retain(|op| op.key() != operation.key());
            self.terminal.push(operation);
            return RetryDisposition::Terminal;
        }

        operation.next_attempt_at = now + self.backoff_delay(&operation);
        tracing::debug!(
            entity_id = %operation.entity_id,
            attempts = operation.attempt_count,
            next_attempt_at = operation.next_attempt_at,
            "Push failed transiently; scheduled retry"
        );
        self.enqueue(operation);
        RetryDisposition::Scheduled
    }

    /// Drop an operation after its push finally succeeded.
    pub fn record_success(&mut self, operation: &PendingOperation) {
        self.pending.retain(|op| op.key() != operation.key());
    }

    /// Whether a record already has a pending or terminal operation, meaning
    /// the push phase should leave it to the retry schedule.
    #[must_use]
    pub fn is_tracked(&self, collection: Collection, entity_id: Uuid) -> bool {
        self.pending
            .iter()
            .chain(self.terminal.iter())
            .any(|op| op.collection == collection && op.entity_id == entity_id)
    }

    /// Number of operations awaiting retry.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Operations that exhausted their budget or failed non-retryably.
    #[must_use]
    pub fn terminal_failures(&self) -> &[PendingOperation] {
        &self.terminal
    }

    /// Put terminal operations back in play with a fresh attempt budget,
    /// for when the caller has fixed the underlying records.
    pub fn reset_terminal(&mut self, now: i64) -> usize {
        let count = self.terminal.len();
        for mut op in self.terminal.drain(..) {
            op.attempt_count = 0;
            op.next_attempt_at = now;
            op.last_error = None;
            self.pending.retain(|p| p.key() != op.key());
            self.pending.push(op);
        }
        count
    }

    /// `base * 2^(attempts-1)`, capped, plus a deterministic jitter of up to
    /// 25% derived from the entity id so co-failing records do not retry in
    /// lockstep.
    fn backoff_delay(&self, operation: &PendingOperation) -> i64 {
        let base = i64::try_from(self.base.as_millis()).unwrap_or(i64::MAX);
        let cap = i64::try_from(self.cap.as_millis()).unwrap_or(i64::MAX);
        let exponent = operation.attempt_count.saturating_sub(1).min(20);
        let delay = base.saturating_mul(1_i64 << exponent).min(cap);
        let jitter_bucket = i64::from(operation.entity_id.as_bytes()[15] % 100);
        delay + delay / 4 * jitter_bucket / 100
    }
}
