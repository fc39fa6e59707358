//! SQLite implementation of the local store

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::migrations;
use crate::models::{ConflictWinner, SyncConflict};
use crate::store::LocalStore;
use crate::sync::{Collection, SyncCheckpoint, SyncRecord};
use crate::{Error, Result};

const RECORD_COLUMNS: &str =
    "collection, id, payload, created_at, updated_at, deleted_at, needs_sync, remote_revision";

/// `SQLite`-backed [`LocalStore`].
///
/// One connection behind a mutex: every trait call is a single statement or
/// transaction, so readers never observe a half-applied write.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and migrate) a database at the given path, creating parent
    /// directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::setup(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self> {
        // WAL for concurrent UI reads while the engine writes.
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("Connection mutex poisoned".to_string()))
    }

    /// Run multiple store operations in one transaction, for caller-side
    /// multi-record writes.
    pub fn with_transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Parse a sync record from a database row
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRecord> {
        let collection: String = row.get(0)?;
        let id: String = row.get(1)?;
        let payload: String = row.get(2)?;
        Ok(SyncRecord {
            collection: collection.parse().map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?,
            id: Uuid::parse_str(&id).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?,
            payload: serde_json::from_str(&payload).map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(error),
                )
            })?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
            needs_sync: row.get::<_, i32>(6)? != 0,
            remote_revision: row.get(7)?,
        })
    }
}

impl LocalStore for SqliteStore {
    fn get(&self, collection: Collection, id: Uuid) -> Result<Option<SyncRecord>> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE collection = ?1 AND id = ?2"),
                params![collection.as_str(), id.to_string()],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn list_active(&self, collection: Collection, limit: usize) -> Result<Vec<SyncRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE collection = ?1 AND deleted_at IS NULL
             ORDER BY updated_at DESC
             LIMIT ?2"
        ))?;
        let records = stmt
            .query_map(
                params![collection.as_str(), limit as i64],
                Self::parse_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn collect_dirty(&self, collection: Collection) -> Result<Vec<SyncRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records
             WHERE collection = ?1 AND needs_sync = 1
             ORDER BY updated_at ASC"
        ))?;
        let records = stmt
            .query_map(params![collection.as_str()], Self::parse_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn upsert_local(&self, record: &SyncRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (collection, id, payload, created_at, updated_at, deleted_at, needs_sync, remote_revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(collection, id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at,
                needs_sync = excluded.needs_sync",
            params![
                record.collection.as_str(),
                record.id.to_string(),
                serde_json::to_string(&record.payload)?,
                record.created_at,
                record.updated_at,
                record.deleted_at,
                i32::from(record.needs_sync),
                record.remote_revision,
            ],
        )?;
        Ok(())
    }

    fn soft_delete_local(&self, collection: Collection, id: Uuid, now: i64) -> Result<()> {
        let conn = self.lock()?;
        // Both assignments read the pre-update updated_at, so the tombstone
        // timestamp equals the advanced updated_at.
        let rows = conn.execute(
            "UPDATE records
             SET deleted_at = MAX(updated_at + 1, ?3),
                 updated_at = MAX(updated_at + 1, ?3),
                 needs_sync = 1
             WHERE collection = ?1 AND id = ?2 AND deleted_at IS NULL",
            params![collection.as_str(), id.to_string(), now],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn apply_remote(&self, record: &SyncRecord) -> Result<bool> {
        let conn = self.lock()?;
        // Whole-record replace, guarded: a strictly-older incoming version
        // never overwrites, keeping updated_at non-decreasing per id.
        // created_at stays immutable on conflict.
        let rows = conn.execute(
            "INSERT INTO records (collection, id, payload, created_at, updated_at, deleted_at, needs_sync, remote_revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)
             ON CONFLICT(collection, id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at,
                deleted_at = excluded.deleted_at,
                needs_sync = 0,
                remote_revision = excluded.remote_revision
             WHERE excluded.updated_at >= records.updated_at",
            params![
                record.collection.as_str(),
                record.id.to_string(),
                serde_json::to_string(&record.payload)?,
                record.created_at,
                record.updated_at,
                record.deleted_at,
                record.remote_revision,
            ],
        )?;
        Ok(rows > 0)
    }

    fn mark_synced(
        &self,
        collection: Collection,
        id: Uuid,
        confirmed_updated_at: i64,
        revision: Option<&str>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE records
             SET needs_sync = 0,
                 remote_revision = COALESCE(?4, remote_revision)
             WHERE collection = ?1 AND id = ?2 AND updated_at = ?3",
            params![
                collection.as_str(),
                id.to_string(),
                confirmed_updated_at,
                revision,
            ],
        )?;
        Ok(rows > 0)
    }

    fn load_checkpoint(&self, collection: Collection) -> Result<SyncCheckpoint> {
        let conn = self.lock()?;
        let checkpoint = conn
            .query_row(
                "SELECT last_synced_at, cursor FROM sync_checkpoints WHERE collection = ?1",
                params![collection.as_str()],
                |row| {
                    Ok(SyncCheckpoint {
                        last_synced_at: row.get(0)?,
                        cursor: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(checkpoint.unwrap_or_default())
    }

    fn save_checkpoint(&self, collection: Collection, checkpoint: &SyncCheckpoint) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_checkpoints (collection, last_synced_at, cursor)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(collection) DO UPDATE SET
                last_synced_at = excluded.last_synced_at,
                cursor = excluded.cursor",
            params![
                collection.as_str(),
                checkpoint.last_synced_at,
                checkpoint.cursor,
            ],
        )?;
        Ok(())
    }

    fn record_conflict(&self, conflict: &SyncConflict) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sync_conflicts (collection, entity_id, local_updated_at, remote_updated_at, winner, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                conflict.collection.as_str(),
                conflict.entity_id.to_string(),
                conflict.local_updated_at,
                conflict.remote_updated_at,
                conflict.winner.as_str(),
                conflict.resolved_at,
            ],
        )?;
        Ok(())
    }

    fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, collection, entity_id, local_updated_at, remote_updated_at, winner, resolved_at
             FROM sync_conflicts
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let conflicts = stmt
            .query_map(params![limit as i64], |row| {
                let collection: String = row.get(1)?;
                let entity_id: String = row.get(2)?;
                let winner: String = row.get(5)?;
                Ok(SyncConflict {
                    id: row.get(0)?,
                    collection: collection.parse().map_err(|error| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(error),
                        )
                    })?,
                    entity_id: Uuid::parse_str(&entity_id).map_err(|error| {
                        rusqlite::Error::FromSqlConversionFailure(
                            2,
                            rusqlite::types::Type::Text,
                            Box::new(error),
                        )
                    })?,
                    local_updated_at: row.get(3)?,
                    remote_updated_at: row.get(4)?,
                    winner: ConflictWinner::parse(&winner).map_err(|error| {
                        rusqlite::Error::FromSqlConversionFailure(
                            5,
                            rusqlite::types::Type::Text,
                            Box::new(error),
                        )
                    })?,
                    resolved_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn dirty(updated_at: i64) -> SyncRecord {
        let mut rec = SyncRecord::new(
            Collection::Entries,
            Uuid::now_v7(),
            json!({"route": "Dreamtime", "grade": "8B+"}),
            updated_at,
        );
        rec.updated_at = updated_at;
        rec
    }

    #[test]
    fn upsert_and_get_round_trip() {
        let store = setup();
        let rec = dirty(100);
        store.upsert_local(&rec).unwrap();

        let fetched = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert_eq!(fetched, rec);
        assert!(store
            .get(Collection::Sessions, rec.id)
            .unwrap()
            .is_none());
    }

    #[test]
    fn upsert_local_preserves_created_at_and_revision() {
        let store = setup();
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
    fn collect_dirty_orders_oldest_first_and_includes_tombstones() {
        let store = setup();
        let newer = dirty(300);
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
    fn apply_remote_guards_against_older_versions() {
        let store = setup();
        let rec = dirty(200);
        store.upsert_local(&rec).unwrap();

        let mut stale = rec.clone();
        stale.updated_at = 100;
        stale.payload = json!({"route": "stale"});
        assert!(!store.apply_remote(&stale).unwrap());

        let mut newer = rec.clone();
        newer.updated_at = 300;
        newer.payload = json!({"route": "fresh"});
        newer.remote_revision = Some("r3".to_string());
        assert!(store.apply_remote(&newer).unwrap());

        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert!(!stored.needs_sync);
        assert_eq!(stored.payload, json!({"route": "fresh"}));
        assert_eq!(stored.remote_revision, Some("r3".to_string()));
        // created_at is immutable across replaces.
        assert_eq!(stored.created_at, rec.created_at);
    }

    #[test]
    fn apply_remote_inserts_missing_records_clean() {
        let store = setup();
        let mut rec = dirty(100);
        rec.needs_sync = true;
        assert!(store.apply_remote(&rec).unwrap());
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert!(!stored.needs_sync);
    }

    #[test]
    fn mark_synced_only_clears_matching_timestamp() {
        let store = setup();
        let rec = dirty(100);
        store.upsert_local(&rec).unwrap();

        assert!(!store
            .mark_synced(Collection::Entries, rec.id, 99, None)
            .unwrap());
        assert!(store
            .get(Collection::Entries, rec.id)
            .unwrap()
            .unwrap()
            .needs_sync);

        assert!(store
            .mark_synced(Collection::Entries, rec.id, 100, Some("etag"))
            .unwrap());
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert!(!stored.needs_sync);
        assert_eq!(stored.remote_revision, Some("etag".to_string()));
    }

    #[test]
    fn soft_delete_tombstones_once() {
        let store = setup();
        let rec = dirty(100);
        store.upsert_local(&rec).unwrap();
        store
            .mark_synced(Collection::Entries, rec.id, 100, None)
            .unwrap();

        store
            .soft_delete_local(Collection::Entries, rec.id, 250)
            .unwrap();
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert_eq!(stored.deleted_at, Some(250));
        assert_eq!(stored.updated_at, 250);
        assert!(stored.needs_sync);

        assert!(store
            .soft_delete_local(Collection::Entries, rec.id, 300)
            .is_err());
    }

    #[test]
    fn soft_delete_advances_past_stalled_clock() {
        let store = setup();
        let rec = dirty(100);
        store.upsert_local(&rec).unwrap();

        store
            .soft_delete_local(Collection::Entries, rec.id, 100)
            .unwrap();
        let stored = store.get(Collection::Entries, rec.id).unwrap().unwrap();
        assert_eq!(stored.updated_at, 101);
        assert_eq!(stored.deleted_at, Some(101));
    }

    #[test]
    fn list_active_excludes_tombstones() {
        let store = setup();
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
    fn checkpoints_persist_per_collection() {
        let store = setup();
        assert_eq!(
            store.load_checkpoint(Collection::Entries).unwrap(),
            SyncCheckpoint::default()
        );

        let checkpoint = SyncCheckpoint {
            last_synced_at: 9_000,
            cursor: Some("page-4".to_string()),
        };
        store
            .save_checkpoint(Collection::Entries, &checkpoint)
            .unwrap();
        assert_eq!(
            store.load_checkpoint(Collection::Entries).unwrap(),
            checkpoint
        );
        assert_eq!(
            store.load_checkpoint(Collection::Sessions).unwrap(),
            SyncCheckpoint::default()
        );
    }

    #[test]
    fn checkpoint_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cairn.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save_checkpoint(Collection::Sessions, &SyncCheckpoint::at(777))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.load_checkpoint(Collection::Sessions).unwrap(),
            SyncCheckpoint::at(777)
        );
    }

    #[test]
    fn conflicts_round_trip_newest_first() {
        let store = setup();
        for (resolved_at, winner) in [(10, ConflictWinner::Remote), (20, ConflictWinner::Local)] {
            store
                .record_conflict(&SyncConflict::new(
                    Collection::Entries,
                    Uuid::now_v7(),
                    5,
                    6,
                    winner,
                    resolved_at,
                ))
                .unwrap();
        }

        let conflicts = store.list_conflicts(10).unwrap();
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].resolved_at, 20);
        assert_eq!(conflicts[0].winner, ConflictWinner::Local);
        assert!(conflicts[0].id > conflicts[1].id);
    }

    #[test]
    fn with_transaction_rolls_back_on_error() {
        let store = setup();
        let result: Result<()> = store.with_transaction(|conn| {
            conn.execute(
                "INSERT INTO sync_checkpoints (collection, last_synced_at) VALUES ('entries', 1)",
                [],
            )?;
            Err(Error::InvalidInput("boom".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(
            store.load_checkpoint(Collection::Entries).unwrap(),
            SyncCheckpoint::default()
        );
    }
}
