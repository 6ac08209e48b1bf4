//! Error types for the sync engine.
//!
//! The five failure classes are kept distinct so callers can apply a
//! different retry policy per class: local storage faults, remote
//! reachability, access control, vanished documents, and payloads whose
//! shape no longer matches what the engine expects.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local store I/O or constraint violation.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Remote backend unreachable or timed out.
    #[error("network failure: {0}")]
    Network(String),

    /// Remote write rejected by access control.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Remote document vanished between metadata probe and fetch.
    #[error("remote document not found: {0}")]
    NotFound(String),

    /// Payload shape mismatch preventing merge. Surfaced, never auto-resolved.
    #[error("conflicting payload shape: {0}")]
    Conflict(String),

    /// Serialization error while encoding a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Subscription or command channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// True for [`SyncError::NotFound`], which reconciliation treats as
    /// "remote now absent" rather than a hard failure.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}
