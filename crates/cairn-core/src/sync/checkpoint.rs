//! Per-collection pull watermark

use serde::{Deserialize, Serialize};

/// Watermark recording how far a previous pull progressed for one
/// collection: the coordinator has observed all remote changes with
/// `updated_at <= last_synced_at`.
///
/// Owned exclusively by the coordinator and persisted so a restart does not
/// force a full re-pull. The checkpoint only advances after an uninterrupted
/// full pull pass; an interrupted pull keeps the prior value so the next
/// cycle re-pulls idempotently from the same point.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Latest remote `updated_at` fully observed (Unix ms); 0 means never
    /// synced
    pub last_synced_at: i64,
    /// Optional remote-assigned resume cursor for the next pull
    pub cursor: Option<String>,
}

impl SyncCheckpoint {
    /// Checkpoint at a given watermark with no cursor.
    #[must_use]
    pub const fn at(last_synced_at: i64) -> Self {
        Self {
            last_synced_at,
            cursor: None,
        }
    }
}
