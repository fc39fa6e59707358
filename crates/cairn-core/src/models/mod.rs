//! Data models for Cairn

mod entry;
mod session;
mod sync_conflict;

pub use entry::{AscentStyle, EntryId, LogEntry};
pub use session::{ClimbSession, SessionId};
pub use sync_conflict::{ConflictWinner, SyncConflict};
