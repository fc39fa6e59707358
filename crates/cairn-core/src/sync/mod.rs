//! The sync engine: change tracking, conflict resolution, retry scheduling,
//! and the coordinator that drives pull/merge/push cycles
//!
//! Local mutations mark records dirty in the local store; the coordinator,
//! triggered by a timer or an explicit request, pulls remote changes since
//! the last checkpoint, reconciles them with last-write-wins, pushes the
//! dirty set, retries transient failures with backoff, and advances the
//! checkpoint.

mod checkpoint;
mod clock;
mod coordinator;
mod error;
mod record;
mod resolver;
mod retry;
mod tracker;

pub use checkpoint::SyncCheckpoint;
pub use clock::{Clock, SystemClock};
pub use coordinator::{
    AbortReason, PullFailure, SyncConfig, SyncCoordinator, SyncOutcome, SyncState, SyncStatus,
    TerminalFailure,
};
pub use error::{SyncError, SyncResult};
pub use record::{Collection, SyncRecord};
pub use resolver::{resolve, Resolution};
pub use retry::{OperationKind, PendingOperation, RetryDisposition, RetryQueue};
pub use tracker::ChangeTracker;
