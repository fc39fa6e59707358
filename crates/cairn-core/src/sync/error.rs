//! Sync engine error taxonomy

use thiserror::Error;

/// Result type alias for sync engine operations
pub type SyncResult<T> = std::result::Result<T, SyncError>;

/// Errors a sync operation can hit, classified by how the engine reacts.
///
/// - [`SyncError::Transient`] goes to the retry queue with backoff.
/// - [`SyncError::Rejected`] is terminal for that record and never retried
///   automatically.
/// - [`SyncError::AuthExpired`] aborts the whole cycle so the caller can
///   refresh credentials; the next cycle is an idempotent retry.
/// - [`SyncError::Storage`] aborts the cycle without advancing the
///   checkpoint.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transient network failure: timeout, connection failure, 5xx,
    /// rate-limiting
    #[error("Transient network error: {0}")]
    Transient(String),

    /// The remote rejected the operation (validation failure, other 4xx)
    #[error("Remote rejected operation: {0}")]
    Rejected(String),

    /// The session/token is no longer valid
    #[error("Authentication expired")]
    AuthExpired,

    /// Local storage failure
    #[error("Local storage error: {0}")]
    Storage(#[from] crate::Error),
}

impl SyncError {
    /// Whether the retry queue should re-attempt this operation.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(SyncError::Transient("timeout".to_string()).is_retryable());
        assert!(!SyncError::Rejected("bad grade".to_string()).is_retryable());
        assert!(!SyncError::AuthExpired.is_retryable());
        assert!(
            !SyncError::Storage(crate::Error::Database("disk full".to_string())).is_retryable()
        );
    }
}
