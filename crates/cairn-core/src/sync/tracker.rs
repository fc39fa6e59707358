//! Change tracking over the local store

use std::sync::Arc;

use uuid::Uuid;

use crate::store::LocalStore;
use crate::sync::{Collection, SyncRecord};
use crate::Result;

/// Produces the exact outbound set for a sync cycle and confirms pushes.
///
/// Performs no network I/O; the only failures are storage errors, which
/// propagate unchanged. Reading the dirty set is side-effect free and safe
/// to repeat, so the coordinator reads it at push time rather than
/// snapshotting earlier.
pub struct ChangeTracker<L> {
    store: Arc<L>,
}

impl<L: LocalStore> ChangeTracker<L> {
    /// Create a tracker over the given store.
    pub const fn new(store: Arc<L>) -> Self {
        Self { store }
    }

    /// All records that must be pushed this cycle, tombstones included.
    pub fn collect_dirty(&self, collection: Collection) -> Result<Vec<SyncRecord>> {
        self.store.collect_dirty(collection)
    }

    /// Number of records awaiting push.
    pub fn dirty_count(&self, collection: Collection) -> Result<usize> {
        Ok(self.store.collect_dirty(collection)?.len())
    }

    /// Clear the dirty flag, but only if `updated_at` still equals the value
    /// that was pushed. A local edit that raced in between the push read and
    /// this confirmation keeps the flag so the newer edit is not dropped.
    pub fn mark_synced(
        &self,
        collection: Collection,
        id: Uuid,
        confirmed_updated_at: i64,
        revision: Option<&str>,
    ) -> Result<bool> {
        let cleared = self
            .store
            .mark_synced(collection, id, confirmed_updated_at, revision)?;
        if !cleared {
            tracing::debug!(
                %id,
                %collection,
                confirmed_updated_at,
                "Push confirmed but record changed since; keeping dirty"
            );
        }
        Ok(cleared)
    }
}
