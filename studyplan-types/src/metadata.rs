//! Document metadata and the last-write-wins conflict comparator.
//!
//! `MetadataModel` is the identity + freshness of a stored document without
//! its payload. Both stores can produce it far cheaper than a full fetch,
//! which is what makes a metadata-first reconciliation pass affordable.

use crate::ids::DocumentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Identity and freshness of a stored document, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataModel {
    /// The document this metadata describes.
    pub document_id: DocumentId,
    /// Last-modified timestamp, equal to the payload's own `updated_at`.
    pub updated_at: DateTime<Utc>,
}

impl MetadataModel {
    /// Creates metadata from its components.
    #[must_use]
    pub const fn new(document_id: DocumentId, updated_at: DateTime<Utc>) -> Self {
        Self {
            document_id,
            updated_at,
        }
    }
}

/// Outcome of comparing local and remote metadata for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Local is strictly newer, or remote is absent: push local.
    UseLocal,
    /// Remote is strictly newer, or local is absent: pull remote.
    UseRemote,
    /// Both present with equal timestamps: already in sync.
    Equal,
    /// Neither side has the document.
    BothAbsent,
}

/// Compares local and remote metadata under last-write-wins rules.
///
/// Total and deterministic for any pair of inputs. A present side always
/// wins over an absent one; between two present sides the strictly greater
/// `updated_at` wins and equal timestamps mean no work.
#[must_use]
pub fn compare(local: Option<&MetadataModel>, remote: Option<&MetadataModel>) -> SyncDecision {
    match (local, remote) {
        (None, None) => SyncDecision::BothAbsent,
        (Some(_), None) => SyncDecision::UseLocal,
        (None, Some(_)) => SyncDecision::UseRemote,
        (Some(l), Some(r)) => {
            if l.updated_at > r.updated_at {
                SyncDecision::UseLocal
            } else if r.updated_at > l.updated_at {
                SyncDecision::UseRemote
            } else {
                SyncDecision::Equal
            }
        }
    }
}

/// A payload type managed by one sync source.
///
/// Every synced payload carries its own `updated_at`, which must equal the
/// value exposed through [`MetadataModel`] so the comparator and the payload
/// agree on freshness.
pub trait SyncedDocument: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Stable identity of this document.
    fn document_id(&self) -> DocumentId;

    /// Last-modified timestamp carried in the payload.
    fn updated_at(&self) -> DateTime<Utc>;

    /// The metadata view of this document.
    fn metadata(&self) -> MetadataModel {
        MetadataModel::new(self.document_id(), self.updated_at())
    }
}
