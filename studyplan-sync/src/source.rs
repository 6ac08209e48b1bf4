//! Local and remote data-source contracts.
//!
//! Every sync manager owns one local/remote pair implementing these traits.
//! Two shapes exist for each side: *single* sources hold exactly one logical
//! document per account (settings, usage counters), *collection* sources
//! hold a keyed set. The contracts are deliberately narrow — upsert, fetch,
//! a cheap metadata probe and an idempotent delete — so any backend that can
//! answer "what do you have, and how fresh is it" can plug in.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use studyplan_types::{DocumentId, MetadataModel, SyncedDocument, UserId};
use tokio::sync::{mpsc, oneshot};

/// The authenticated account on whose behalf the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: UserId,
}

impl CurrentUser {
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// Access level granted on a remote document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

/// A single grant within a permission scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub user_id: UserId,
    pub permission: Permission,
}

/// Access-control scope attached to remote documents at creation time.
///
/// The engine never creates a remote document without one; collection-level
/// isolation per account is enforced by the backend against this scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScope {
    pub grants: Vec<PermissionGrant>,
}

impl PermissionScope {
    /// Full read/write scope for a single owning account.
    #[must_use]
    pub fn owner(user_id: UserId) -> Self {
        Self {
            grants: vec![
                PermissionGrant {
                    user_id,
                    permission: Permission::Read,
                },
                PermissionGrant {
                    user_id,
                    permission: Permission::Write,
                },
            ],
        }
    }

    /// Whether this scope allows the given account to write.
    #[must_use]
    pub fn allows_write(&self, user_id: UserId) -> bool {
        self.grants
            .iter()
            .any(|g| g.user_id == user_id && g.permission == Permission::Write)
    }
}

/// Kind of remote change reported through a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One push-delivered remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub document_id: DocumentId,
    pub kind: ChangeKind,
}

/// A live remote change feed.
///
/// Wraps the receiving half of a channel fed by a background task inside the
/// remote adapter. Cancelling (or dropping) the subscription stops that task
/// and guarantees no further events are delivered.
pub struct ChangeSubscription {
    rx: mpsc::Receiver<ChangeEvent>,
    cancel: Option<oneshot::Sender<()>>,
}

impl ChangeSubscription {
    /// Wraps an event receiver and the cancel handle of its feeding task.
    #[must_use]
    pub fn new(rx: mpsc::Receiver<ChangeEvent>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            rx,
            cancel: Some(cancel),
        }
    }

    /// Receives the next change event. Returns `None` once the feed closed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Cancels the subscription and closes the event channel.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
        self.rx.close();
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Local store for a singleton per-account document.
#[async_trait]
pub trait LocalSingleSource<T: SyncedDocument>: Send + Sync {
    /// Upserts the document. Writes carrying an older `updated_at` than the
    /// stored row are ignored.
    async fn add_or_update_item(&self, item: T) -> SyncResult<()>;

    /// Returns the current document, if any.
    async fn fetch_item(&self) -> SyncResult<Option<T>>;

    /// Returns identity + freshness without materializing the payload.
    async fn fetch_metadata(&self) -> SyncResult<Option<MetadataModel>>;

    /// Removes the document. Deleting an absent row is not an error.
    async fn delete_item(&self) -> SyncResult<()>;
}

/// Local store for a keyed document collection.
#[async_trait]
pub trait LocalCollectionSource<T: SyncedDocument>: Send + Sync {
    /// Upserts by id. Writes carrying an older `updated_at` than the stored
    /// row are ignored.
    async fn add_or_update_item(&self, item: T) -> SyncResult<()>;

    /// Returns one document by id.
    async fn fetch_item(&self, id: DocumentId) -> SyncResult<Option<T>>;

    /// Returns the full current set. Ordering is unspecified.
    async fn fetch_all(&self) -> SyncResult<Vec<T>>;

    /// Returns identity + freshness for one id without the payload.
    async fn fetch_metadata(&self, id: DocumentId) -> SyncResult<Option<MetadataModel>>;

    /// Returns metadata for every stored document.
    async fn fetch_all_metadata(&self) -> SyncResult<Vec<MetadataModel>>;

    /// Removes one document. Deleting an absent row is not an error.
    async fn delete_item(&self, id: DocumentId) -> SyncResult<()>;

    /// Removes every document in this collection.
    async fn clear(&self) -> SyncResult<()>;
}

/// Remote store for a singleton per-account document.
#[async_trait]
pub trait RemoteSingleSource<T: SyncedDocument>: Send + Sync {
    /// The scope to attach when creating the remote document.
    fn permissions(&self, user: &CurrentUser) -> PermissionScope;

    /// Upserts the document under the given scope.
    async fn add_or_update_item(&self, item: T, scope: &PermissionScope) -> SyncResult<()>;

    /// Returns the current remote document, if any.
    async fn fetch_item(&self) -> SyncResult<Option<T>>;

    /// Returns identity + freshness without the payload.
    async fn fetch_metadata(&self) -> SyncResult<Option<MetadataModel>>;

    /// Removes the remote document. Idempotent.
    async fn delete_item(&self) -> SyncResult<()>;

    /// Opens a push channel for changes to the document.
    async fn subscribe_to_changes(&self) -> SyncResult<ChangeSubscription>;
}

/// Remote store for a keyed document collection.
#[async_trait]
pub trait RemoteCollectionSource<T: SyncedDocument>: Send + Sync {
    /// The scope to attach when creating remote documents.
    fn permissions(&self, user: &CurrentUser) -> PermissionScope;

    /// Upserts one document under the given scope.
    async fn add_or_update_item(&self, item: T, scope: &PermissionScope) -> SyncResult<()>;

    /// Returns one remote document by id.
    async fn fetch_item(&self, id: DocumentId) -> SyncResult<Option<T>>;

    /// Returns metadata for every remote document in the collection.
    async fn fetch_all_metadata(&self) -> SyncResult<Vec<MetadataModel>>;

    /// Returns identity + freshness for one id without the payload.
    async fn fetch_metadata(&self, id: DocumentId) -> SyncResult<Option<MetadataModel>>;

    /// Removes one remote document. Idempotent.
    async fn delete_item(&self, id: DocumentId) -> SyncResult<()>;

    /// Opens a push channel for changes to the collection.
    async fn subscribe_to_changes(&self) -> SyncResult<ChangeSubscription>;
}

/// Maps a payload decode failure to the conflict class: the stored shape no
/// longer matches the expected payload type.
pub(crate) fn decode_conflict(context: &str, e: serde_json::Error) -> SyncError {
    SyncError::Conflict(format!("{context}: {e}"))
}
