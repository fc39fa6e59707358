//! Remote store seam consumed by the sync engine

mod http;

pub use http::HttpRemote;

use uuid::Uuid;

use crate::sync::{Collection, SyncRecord, SyncResult};

/// One page of remote changes.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    /// Records changed since the requested watermark
    pub records: Vec<SyncRecord>,
    /// Token for the next page; `None` when the pull is exhausted
    pub next_page_token: Option<String>,
}

/// The backend the engine reconciles against, one request per operation.
///
/// All operations are per-collection and keyed by the logical record id.
/// Errors must be classified into the [`crate::sync::SyncError`] taxonomy;
/// the engine's retry behavior is driven entirely by that classification.
pub trait RemoteStore: Send + Sync {
    /// Fetch records with `updated_at > since`, bounded page size, resumable
    /// via `page_token`.
    fn fetch_updated_since(
        &self,
        collection: Collection,
        since: i64,
        page_token: Option<&str>,
    ) -> impl std::future::Future<Output = SyncResult<RemotePage>> + Send;

    /// Create-or-update one record. Returns the remote-assigned revision
    /// when the backend supplies one.
    fn upsert(
        &self,
        record: &SyncRecord,
    ) -> impl std::future::Future<Output = SyncResult<Option<String>>> + Send;

    /// Propagate a tombstone.
    fn soft_delete(
        &self,
        collection: Collection,
        id: Uuid,
        deleted_at: i64,
    ) -> impl std::future::Future<Output = SyncResult<()>> + Send;
}
