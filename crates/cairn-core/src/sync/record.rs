//! The synchronized record envelope and collection keys
//!
//! Every entity Cairn synchronizes travels through the engine as a
//! [`SyncRecord`]: a stable id, the sync metadata timestamps, and the domain
//! payload as opaque JSON. Domain models convert to and from the envelope at
//! the edges; the engine itself never looks inside `payload`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// An entity collection synchronized by the engine.
///
/// The string form doubles as the SQL discriminator and the remote URL path
/// segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    /// Logbook entries (individual ascents)
    Entries,
    /// Climbing sessions (a day at one crag)
    Sessions,
}

impl Collection {
    /// All collections the engine processes, in cycle order.
    pub const ALL: [Self; 2] = [Self::Entries, Self::Sessions];

    /// Stable string form used in storage and on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Entries => "entries",
            Self::Sessions => "sessions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entries" => Ok(Self::Entries),
            "sessions" => Ok(Self::Sessions),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown collection: {other}"
            ))),
        }
    }
}

/// A synchronized record: sync metadata plus an opaque domain payload.
///
/// Invariants the stores uphold:
/// - `id` never changes after creation; it joins local and remote versions.
/// - `updated_at` is non-decreasing for a given `id` within one store.
/// - A tombstone (`deleted_at` set) stays present until both sides observed
///   the delete; it is excluded from active queries only.
/// - `needs_sync` is set on every local mutation and cleared only once the
///   remote durably accepted that exact `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Stable logical identifier, generated client-side
    pub id: Uuid,
    /// Collection this record belongs to
    pub collection: Collection,
    /// Domain payload, opaque to the engine
    pub payload: Value,
    /// Creation timestamp (Unix ms), immutable
    pub created_at: i64,
    /// Last mutation timestamp (Unix ms); the conflict tie-break signal
    pub updated_at: i64,
    /// Soft-delete timestamp; `Some` marks a tombstone
    pub deleted_at: Option<i64>,
    /// Local dirty flag: value not yet confirmed accepted by the remote
    #[serde(default)]
    pub needs_sync: bool,
    /// Opaque remote-assigned revision/etag, if the backend supplies one
    #[serde(default)]
    pub remote_revision: Option<String>,
}

impl SyncRecord {
    /// Create a new dirty record, as a local mutation would.
    #[must_use]
    pub const fn new(collection: Collection, id: Uuid, payload: Value, now: i64) -> Self {
        Self {
            id,
            collection,
            payload,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            needs_sync: true,
            remote_revision: None,
        }
    }

    /// Whether this record is a soft-delete tombstone.
    #[must_use]
    pub const fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Register a local mutation: advance `updated_at` and mark dirty.
    ///
    /// `updated_at` stays strictly increasing even if the wall clock has not
    /// moved since the previous mutation (coarse clock granularity).
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now.max(self.updated_at + 1);
        self.needs_sync = true;
    }

    /// Soft-delete this record, turning it into a dirty tombstone.
    pub fn tombstone(&mut self, now: i64) {
        self.touch(now);
        self.deleted_at = Some(self.updated_at);
    }

    /// Whether two versions carry the same content (payload and tombstone
    /// state), ignoring local-only bookkeeping flags.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.payload == other.payload && self.deleted_at.is_some() == other.deleted_at.is_some()
    }
}
