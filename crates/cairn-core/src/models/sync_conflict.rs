//! Sync conflict audit model

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sync::Collection;

/// Which side a resolved conflict kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictWinner {
    /// The local version survived; the remote one was rejected
    Local,
    /// The remote version overwrote a diverged local one
    Remote,
}

impl ConflictWinner {
    /// Stable string form used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    /// Parse the storage string form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown conflict winner: {other}"
            ))),
        }
    }
}

/// Recorded conflict resolved by last-write-wins, kept so the UI can show
/// which divergent edits were discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier; assigned by the store, 0 before insertion
    pub id: i64,
    /// Collection of the record involved
    pub collection: Collection,
    /// Record involved in the conflict
    pub entity_id: Uuid,
    /// Local version's timestamp when the conflict occurred
    pub local_updated_at: i64,
    /// Remote version's timestamp when the conflict occurred
    pub remote_updated_at: i64,
    /// Which side won
    pub winner: ConflictWinner,
    /// Resolution timestamp (Unix ms)
    pub resolved_at: i64,
}

impl SyncConflict {
    /// Build an unsaved conflict row.
    #[must_use]
    pub const fn new(
        collection: Collection,
        entity_id: Uuid,
        local_updated_at: i64,
        remote_updated_at: i64,
        winner: ConflictWinner,
        resolved_at: i64,
    ) -> Self {
        Self {
            id: 0,
            collection,
            entity_id,
            local_updated_at,
            remote_updated_at,
            winner,
            resolved_at,
        }
    }
}
