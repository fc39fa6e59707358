//! In-memory `LocalStore` implementation
//!
//! Reference semantics for the trait contract and the backing store for the
//! engine's integration tests. Interior mutability through a single mutex;
//! each trait call is one critical section, which gives the same
//! atomic-per-mutation guarantee the SQLite store gets from its statements.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::LocalStore;
use crate::models::SyncConflict;
use crate::sync::{Collection, SyncCheckpoint, SyncRecord};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    records: HashMap<(Collection, Uuid), SyncRecord>,
    checkpoints: HashMap<Collection, SyncCheckpoint>,
    conflicts: Vec<SyncConflict>,
    next_conflict_id: i64,
}

/// Hash-map backed store, primarily for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Database("Store mutex poisoned".to_string()))
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, collection: Collection, id: Uuid) -> Result<Option<SyncRecord>> {
        Ok(self.lock()?.records.get(&(collection, id)).cloned())
    }

    fn list_active(&self, collection: Collection, limit: usize) -> Result<Vec<SyncRecord>> {
        let inner = self.lock()?;
        let mut records: Vec<SyncRecord> = inner
            .records
            .values()
            .filter(|rec| rec.collection == collection && !rec.is_tombstone())
            .cloned()
            .collect();
        records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        records.truncate(limit);
        Ok(records)
    }

    fn collect_dirty(&self, collection: Collection) -> Result<Vec<SyncRecord>> {
        let inner = self.lock()?;
        let mut records: Vec<SyncRecord> = inner
            .records
            .values()
            .filter(|rec| rec.collection == collection && rec.needs_sync)
            .cloned()
            .collect();
        records.sort_by_key(|rec| rec.updated_at);
        Ok(records)
    }

    fn upsert_local(&self, record: &SyncRecord) -> Result<()> {
        let mut inner = self.lock()?;
        let key = (record.collection, record.id);
        let mut stored = record.clone();
        if let Some(existing) = inner.records.get(&key) {
            stored.created_at = existing.created_at;
            stored.remote_revision = existing.remote_revision.clone();
        }
        inner.records.insert(key, stored);
        Ok(())
    }

    fn soft_delete_local(&self, collection: Collection, id: Uuid, now: i64) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.records.get_mut(&(collection, id)) {
            Some(rec) if !rec.is_tombstone() => {
                rec.tombstone(now);
                Ok(())
            }
            _ => Err(Error::NotFound(id.to_string())),
        }
    }

    fn apply_remote(&self, record: &SyncRecord) -> Result<bool> {
        let mut inner = self.lock()?;
        let key = (record.collection, record.id);
        if let Some(existing) = inner.records.get(&key) {
            // Strictly-older versions never overwrite; equal timestamps only
            // arrive here when the resolver ruled remote-wins.
            if record.updated_at < existing.updated_at {
                return Ok(false);
            }
        }
        let mut applied = record.clone();
        applied.needs_sync = false;
        inner.records.insert(key, applied);
        Ok(true)
    }

    fn mark_synced(
        &self,
        collection: Collection,
        id: Uuid,
        confirmed_updated_at: i64,
        revision: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        let Some(rec) = inner.records.get_mut(&(collection, id)) else {
            return Ok(false);
        };
        if rec.updated_at != confirmed_updated_at {
            return Ok(false);
        }
        rec.needs_sync = false;
        if let Some(revision) = revision {
            rec.remote_revision = Some(revision.to_string());
        }
        Ok(true)
    }

    fn load_checkpoint(&self, collection: Collection) -> Result<SyncCheckpoint> {
        Ok(self
            .lock()?
            .checkpoints
            .get(&collection)
            .cloned()
            .unwrap_or_default())
    }

    fn save_checkpoint(&self, collection: Collection, checkpoint: &SyncCheckpoint) -> Result<()> {
        self.lock()?.checkpoints.insert(collection, checkpoint.clone());
        Ok(())
    }

    fn record_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        let mut inner = self.lock()?;
        inner.next_conflict_id += 1;
        let mut stored = conflict.clone();
        stored.id = inner.next_conflict_id;
        inner.conflicts.push(stored);
        Ok(())
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let inner = self.lock()?;
        Ok(inner.conflicts.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConflictWinner;
    use serde_json::json;

    fn dirty(updated_at: i64) -> SyncRecord {
        let mut rec = SyncRecord::new(
            Collection::Entries,
            Uuid::now_v7(),
            json!({"route": "Separate Reality"}),
            updated_at,
        );
        rec.updated_at = updated_at;
        rec
    }

    #[test]
    fn collect_dirty_includes_tombstones_and_orders_oldest_first() {
        let store = MemoryStore::new();
        let newer = dirty(200);
        let mut older = dirty(100);
        older.deleted_at = Some(100);
        store.upsert_local(&newer).unwrap();
        store.upsert_local(&older).unwrap();

        let set = store.collect_dirty(Collection::Entries).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].id, older.id);
        assert!(set[0].is_tombstone());
    }

    #[test]
    fn upsert_local_preserves_created_at_and_revision() {
        let store = MemoryStore::new();
        let mut rec = dirty(100);
        store.upsert_local(&rec).unwrap();
        store
            .mark_synced(Collection::Entries, rec.id, 100, Some("r1"))
            .unwrap();

        rec.touch(200);
        rec.created_at = 999;
        rec.payload = json!({"route": "renamed"});
        store.upsert_local(&rec).unwrap();

        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert_eq!(stored.created_at, 100);
        assert_eq!(stored.remote_revision, Some("r1".to_string()));
        assert_eq!(stored.payload, json!({"route": "renamed"}));
        assert!(stored.needs_sync);
    }

    #[test]
    fn apply_remote_refuses_strictly_older_versions() {
        let store = MemoryStore::new();
        let current = dirty(200);
        store.upsert_local(&current).unwrap();

        let mut stale = current.clone();
        stale.updated_at = 150;
        stale.payload = json!({"route": "stale"});
        assert!(!store.apply_remote(&stale).unwrap());

        let kept = store.get(Collection::Entries, current.id).unwrap().unwrap();
        assert_eq!(kept.updated_at, 200);
        assert_eq!(kept.payload, current.payload);
    }

    #[test]
    fn apply_remote_replaces_whole_record_and_lands_clean() {
        let store = MemoryStore::new();
        let local = dirty(100);
        store.upsert_local(&local).unwrap();

        let mut remote = local.clone();
        remote.updated_at = 300;
        remote.payload = json!({"route": "renamed"});
        remote.remote_revision = Some("r7".to_string());
        assert!(store.apply_remote(&remote).unwrap());

        let stored = store.get(Collection::Entries, local.id).unwrap().unwrap();
        assert!(!stored.needs_sync);
        assert_eq!(stored.payload, json!({"route": "renamed"}));
        assert_eq!(stored.remote_revision, Some("r7".to_string()));
    }

    #[test]
    fn mark_synced_guards_against_racing_edits() {
        let store = MemoryStore::new();
        let mut rec = dirty(100);
        store.upsert_local(&rec).unwrap();

        // Edit lands after the push read the record but before confirmation.
        rec.touch(150);
        store.upsert_local(&rec).unwrap();

        assert!(!store
            .mark_synced(Collection::Entries, rec.id, 100, Some("r1"))
            .unwrap());
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert!(stored.needs_sync);

        assert!(store
            .mark_synced(Collection::Entries, rec.id, stored.updated_at, Some("r2"))
            .unwrap());
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert!(!stored.needs_sync);
        assert_eq!(stored.remote_revision, Some("r2".to_string()));
    }

    #[test]
    fn soft_delete_requires_a_live_record() {
        let store = MemoryStore::new();
        let rec = dirty(100);
        store.upsert_local(&rec).unwrap();

        store
            .soft_delete_local(Collection::Entries, rec.id, 200)
            .unwrap();
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert!(stored.is_tombstone());
        assert!(stored.needs_sync);

        assert!(store
            .soft_delete_local(Collection::Entries, rec.id, 300)
            .is_err());
        assert!(store
            .soft_delete_local(Collection::Entries, Uuid::now_v7(), 300)
            .is_err());
    }

    #[test]
    fn list_active_excludes_tombstones() {
        let store = MemoryStore::new();
        let live = dirty(100);
        let mut dead = dirty(200);
        dead.deleted_at = Some(200);
        store.upsert_local(&live).unwrap();
        store.upsert_local(&dead).unwrap();

        let active = store.list_active(Collection::Entries, 10).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, live.id);
    }

    #[test]
    fn checkpoints_default_and_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(
            store.load_checkpoint(Collection::Entries).unwrap(),
            SyncCheckpoint::default()
        );

        let checkpoint = SyncCheckpoint::at(12345);
        store
            .save_checkpoint(Collection::Entries, &checkpoint)
            .unwrap();
        assert_eq!(
            store.load_checkpoint(Collection::Entries).unwrap(),
            checkpoint
        );
        // Other collections unaffected.
        assert_eq!(
            store.load_checkpoint(Collection::Sessions).unwrap(),
            SyncCheckpoint::default()
        );
    }

    #[test]
    fn conflicts_are_listed_newest_first_with_assigned_ids() {
        let store = MemoryStore::new();
        for resolved_at in [10, 20] {
            store
                .record_conflict(&SyncConflict::new(
                    Collection::Entries,
                    Uuid::now_v7(),
                    1,
                    2,
                    ConflictWinner::Remote,
                    resolved_at,
                ))
                .unwrap();
        }
        let conflicts = store.list_conflicts(10).unwrap();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].resolved_at, 20);
        assert!(conflicts[0].id > conflicts[1].id);
    }
}
