//! Local store seam consumed by the sync engine
//!
//! The engine never assumes a concrete storage technology; it talks to
//! whatever implements [`LocalStore`]. Two implementations ship with the
//! crate: [`MemoryStore`] (tests, reference semantics) and
//! [`crate::db::SqliteStore`] (production).

mod memory;

pub use memory::MemoryStore;

use uuid::Uuid;

use crate::models::SyncConflict;
use crate::sync::{Collection, SyncCheckpoint, SyncRecord};
use crate::Result;

/// Transactional local store holding the synchronized records.
///
/// Every mutating method must be atomic on its own: a concurrent reader
/// never observes a half-applied reconciliation. All methods are fast local
/// operations; only the remote store suspends.
pub trait LocalStore: Send + Sync {
    /// Fetch one record by id, tombstones included.
    fn get(&self, collection: Collection, id: Uuid) -> Result<Option<SyncRecord>>;

    /// List live (non-tombstoned) records, newest first.
    fn list_active(&self, collection: Collection, limit: usize) -> Result<Vec<SyncRecord>>;

    /// All records with `needs_sync` set, tombstones included, oldest
    /// mutation first. No side effects.
    fn collect_dirty(&self, collection: Collection) -> Result<Vec<SyncRecord>>;

    /// Write a local mutation. The caller is responsible for having
    /// advanced `updated_at` and set `needs_sync` (see
    /// [`SyncRecord::touch`]). On an existing record, `created_at` and the
    /// stored `remote_revision` are preserved; only [`Self::apply_remote`]
    /// replaces those.
    fn upsert_local(&self, record: &SyncRecord) -> Result<()>;

    /// Soft-delete a live record: set `deleted_at`, advance `updated_at`,
    /// mark dirty. Errors with [`crate::Error::NotFound`] if no live record
    /// exists.
    fn soft_delete_local(&self, collection: Collection, id: Uuid, now: i64) -> Result<()>;

    /// Apply a winning remote version as a whole-record replace; the record
    /// lands clean (`needs_sync = false`).
    ///
    /// Refuses strictly-older versions so `updated_at` stays non-decreasing
    /// even if a stale page is re-applied. Returns whether the write was
    /// applied.
    fn apply_remote(&self, record: &SyncRecord) -> Result<bool>;

    /// Clear `needs_sync` only if the record's `updated_at` still equals
    /// `confirmed_updated_at`; a local edit that raced in after the push
    /// keeps the flag. Stores the remote revision when one was assigned.
    /// Returns whether the flag was cleared.
    fn mark_synced(
        &self,
        collection: Collection,
        id: Uuid,
        confirmed_updated_at: i64,
        revision: Option<&str>,
    ) -> Result<bool>;

    /// Load the pull watermark for a collection (default when never synced).
    fn load_checkpoint(&self, collection: Collection) -> Result<SyncCheckpoint>;

    /// Persist the pull watermark for a collection.
    fn save_checkpoint(&self, collection: Collection, checkpoint: &SyncCheckpoint) -> Result<()>;

    /// Record a resolved conflict for later inspection.
    fn record_conflict(&self, conflict: &SyncConflict) -> Result<()>;

    /// List recently resolved conflicts, newest first.
    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}
