//! cairn-core - Core library for Cairn
//!
//! This crate contains the shared models, the local storage layer, and the
//! sync engine used by all Cairn interfaces (mobile, CLI).

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
pub use models::{ClimbSession, EntryId, LogEntry, SessionId};
pub use sync::{Collection, SyncRecord};
