//! SQLite-backed local storage

mod migrations;
mod store;

pub use store::SqliteStore;
