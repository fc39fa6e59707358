//! Last-write-wins conflict resolution
//!
//! A pure, deterministic decision over two snapshots of the same logical
//! record. The strictly greater `updated_at` wins in full (whole-record
//! replace, no field merge). Tombstones participate like any other update:
//! a later edit resurrects a record deleted by a stale client, a later
//! delete overrides a stale edit.

use super::record::SyncRecord;

/// Outcome of resolving a local version against a remote version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The local version is authoritative; a push is (still) needed
    KeepLocal,
    /// The remote version is authoritative; apply it to the local store
    AcceptRemote,
    /// Both sides already agree; nothing to do
    Noop,
}

/// Decide the reconciled state for one logical id.
///
/// Tie policy: when `updated_at` is exactly equal (coarse clock granularity
/// across devices) the remote version wins, unless the content is identical
/// in which case the result is [`Resolution::Noop`]. Arbitrary but
/// deterministic, and symmetric with the remote end applying the same rule
/// to its own incoming writes.
#[must_use]
pub fn resolve(local: Option<&SyncRecord>, remote: Option<&SyncRecord>) -> Resolution {
    match (local, remote) {
        (None, None) => Resolution::Noop,
        (Some(_), None) => Resolution::KeepLocal,
        (None, Some(_)) => Resolution::AcceptRemote,
        (Some(local), Some(remote)) => {
            debug_assert_eq!(local.id, remote.id);
            if local.updated_at > remote.updated_at {
                Resolution::KeepLocal
            } else if local.updated_at < remote.updated_at {
                Resolution::AcceptRemote
            } else if local.same_content(remote) {
                Resolution::Noop
            } else {
                // Exact timestamp tie: remote wins.
                Resolution::AcceptRemote
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::record::Collection;
    use serde_json::json;
    use uuid::Uuid;

    fn version(id: Uuid, updated_at: i64, payload: serde_json::Value) -> SyncRecord {
        let mut rec = SyncRecord::new(Collection::Entries, id, payload, 1);
        rec.updated_at = updated_at;
        rec
    }

    #[test]
    fn single_sided_records_are_authoritative() {
        let id = Uuid::now_v7();
        let rec = version(id, 10, json!({"route": "Action Directe"}));
        assert_eq!(resolve(Some(&rec), None), Resolution::KeepLocal);
        assert_eq!(resolve(None, Some(&rec)), Resolution::AcceptRemote);
        assert_eq!(resolve(None, None), Resolution::Noop);
    }

    #[test]
    fn later_timestamp_wins_regardless_of_side() {
        let id = Uuid::now_v7();
        let older = version(id, 10, json!({"grade": "7a"}));
        let newer = version(id, 20, json!({"grade": "7a+"}));

        assert_eq!(resolve(Some(&older), Some(&newer)), Resolution::AcceptRemote);
        assert_eq!(resolve(Some(&newer), Some(&older)), Resolution::KeepLocal);
    }

    #[test]
    fn exact_tie_goes_to_remote() {
        let id = Uuid::now_v7();
        let local = version(id, 10, json!({"notes": "crimpy"}));
        let remote = version(id, 10, json!({"notes": "slopey"}));
        assert_eq!(resolve(Some(&local), Some(&remote)), Resolution::AcceptRemote);
    }

    #[test]
    fn identical_content_is_a_noop() {
        let id = Uuid::now_v7();
        let local = version(id, 10, json!({"notes": "crimpy"}));
        let mut remote = local.clone();
        remote.needs_sync = false;
        remote.remote_revision = Some("r1".to_string());
        assert_eq!(resolve(Some(&local), Some(&remote)), Resolution::Noop);
    }

    #[test]
    fn later_tombstone_overrides_stale_edit() {
        let id = Uuid::now_v7();
        let edit = version(id, 10, json!({"notes": "sent it"}));
        let mut tomb = version(id, 20, json!({"notes": "sent it"}));
        tomb.deleted_at = Some(20);

        assert_eq!(resolve(Some(&edit), Some(&tomb)), Resolution::AcceptRemote);
    }

    #[test]
    fn later_edit_resurrects_stale_tombstone() {
        let id = Uuid::now_v7();
        let mut tomb = version(id, 10, json!({"notes": "old"}));
        tomb.deleted_at = Some(10);
        let edit = version(id, 20, json!({"notes": "back on"}));

        assert_eq!(resolve(Some(&tomb), Some(&edit)), Resolution::AcceptRemote);
        assert_eq!(resolve(Some(&edit), Some(&tomb)), Resolution::KeepLocal);
    }

    #[test]
    fn resolution_is_deterministic_for_repeated_input() {
        let id = Uuid::now_v7();
        let a = version(id, 10, json!({"attempts": 3}));
        let b = version(id, 12, json!({"attempts": 4}));
        for _ in 0..10 {
            assert_eq!(resolve(Some(&a), Some(&b)), Resolution::AcceptRemote);
        }
    }
}
