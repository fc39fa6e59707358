//! Climbing session model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::sync::{Collection, SyncRecord};
use crate::{Error, Result};

/// A unique identifier for a session, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new unique session ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// The underlying UUID, used as the sync join key
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A day of climbing at one location; entries reference it loosely through
/// the UI, not through sync-level foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClimbSession {
    /// Unique identifier
    pub id: SessionId,
    /// Crag or gym name
    pub location: String,
    /// Session date
    pub date: NaiveDate,
    /// Free-form notes
    pub notes: String,
}

impl ClimbSession {
    /// Create a new session.
    #[must_use]
    pub fn new(location: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: SessionId::new(),
            location: location.into(),
            date,
            notes: String::new(),
        }
    }

    /// Wrap this session in a dirty sync record ready for the local store.
    pub fn to_record(&self, now: i64) -> Result<SyncRecord> {
        Ok(SyncRecord::new(
            Collection::Sessions,
            self.id.as_uuid(),
            serde_json::to_value(self)?,
            now,
        ))
    }

    /// Decode a session from a sync record payload.
    pub fn from_record(record: &SyncRecord) -> Result<Self> {
        if record.collection != Collection::Sessions {
            return Err(Error::InvalidInput(format!(
                "Expected a sessions record, got {}",
                record.collection
            )));
        }
        Ok(serde_json::from_value(record.payload.clone())?)
    }
}
