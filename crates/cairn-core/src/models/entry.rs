//! Logbook entry model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::sync::{Collection, SyncRecord};
use crate::{Error, Result};

/// A unique identifier for a logbook entry, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Create a new unique entry ID using UUID v7
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

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How an ascent went
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AscentStyle {
    /// First try, no prior knowledge
    Onsight,
    /// First try, with beta
    Flash,
    /// Clean ascent after working the route
    Redpoint,
    /// Did not top out
    Attempt,
}

impl fmt::Display for AscentStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Onsight => "onsight",
            Self::Flash => "flash",
            Self::Redpoint => "redpoint",
            Self::Attempt => "attempt",
        };
        f.write_str(s)
    }
}

/// One logged ascent. The grade is an opaque string; parsing and comparing
/// grade systems is a UI concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier
    pub id: EntryId,
    /// Route or boulder name
    pub route: String,
    /// Grade as entered (e.g. "7a+", "V6", "5.12a")
    pub grade: String,
    /// Ascent style
    pub style: AscentStyle,
    /// Number of attempts on the day
    pub attempts: u32,
    /// Free-form notes
    pub notes: String,
    /// Day the ascent happened
    pub climbed_on: NaiveDate,
}

impl LogEntry {
    /// Create a new entry for today's date with a single attempt.
    #[must_use]
    pub fn new(
        route: impl Into<String>,
        grade: impl Into<String>,
        style: AscentStyle,
        climbed_on: NaiveDate,
    ) -> Self {
        Self {
            id: EntryId::new(),
            route: route.into(),
            grade: grade.into(),
            style,
            attempts: 1,
            notes: String::new(),
            climbed_on,
        }
    }

    /// Wrap this entry in a dirty sync record ready for the local store.
    pub fn to_record(&self, now: i64) -> Result<SyncRecord> {
        Ok(SyncRecord::new(
            Collection::Entries,
            self.id.as_uuid(),
            serde_json::to_value(self)?,
            now,
        ))
    }

    /// Decode an entry from a sync record payload.
    pub fn from_record(record: &SyncRecord) -> Result<Self> {
        if record.collection != Collection::Entries {
            return Err(Error::InvalidInput(format!(
                "Expected an entries record, got {}",
                record.collection
            )));
        }
        Ok(serde_json::from_value(record.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_entry_id_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
    }

    #[test]
    fn test_entry_id_parse() {
        let id = EntryId::new();
        let parsed: EntryId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn record_round_trip_preserves_entry() {
        let mut entry = LogEntry::new("Rainbow Rocket", "8A", AscentStyle::Flash, date("2026-03-14"));
        entry.attempts = 2;
        entry.notes = "cold conditions".to_string();

        let record = entry.to_record(1_000).unwrap();
        assert_eq!(record.collection, Collection::Entries);
        assert_eq!(record.id, entry.id.as_uuid());
        assert!(record.needs_sync);

        let decoded = LogEntry::from_record(&record).unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn from_record_rejects_wrong_collection() {
        let entry = LogEntry::new("La Dura Dura", "9b+", AscentStyle::Redpoint, date("2026-01-02"));
        let mut record = entry.to_record(1_000).unwrap();
        record.collection = Collection::Sessions;
        assert!(LogEntry::from_record(&record).is_err());
    }
}
