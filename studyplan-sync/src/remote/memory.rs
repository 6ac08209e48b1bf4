//! In-memory remote store.
//!
//! Implements the full remote contracts over a `HashMap` with a broadcast
//! change feed, so the engine can run against it exactly as it would against
//! the hosted backend. Fault toggles (`set_offline`, `fail_document`) let
//! tests force the failure classes the managers must isolate.

use crate::error::{SyncError, SyncResult};
use crate::source::{
    ChangeEvent, ChangeKind, ChangeSubscription, CurrentUser, PermissionScope,
    RemoteCollectionSource, RemoteSingleSource,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use studyplan_types::{DocumentId, MetadataModel, SyncedDocument, UserId};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};

struct RemoteDoc<T> {
    item: T,
    scope: PermissionScope,
}

struct Faults {
    offline: AtomicBool,
    failing: RwLock<HashSet<DocumentId>>,
    writes: AtomicUsize,
}

impl Faults {
    fn new() -> Self {
        Self {
            offline: AtomicBool::new(false),
            failing: RwLock::new(HashSet::new()),
            writes: AtomicUsize::new(0),
        }
    }

    fn check_online(&self) -> SyncResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(SyncError::Network("remote store is offline".into()))
        } else {
            Ok(())
        }
    }

    async fn check_document(&self, id: DocumentId) -> SyncResult<()> {
        if self.failing.read().await.contains(&id) {
            Err(SyncError::Network(format!(
                "injected failure for document {id}"
            )))
        } else {
            Ok(())
        }
    }
}

fn spawn_change_feed(changes: &broadcast::Sender<ChangeEvent>) -> ChangeSubscription {
    let mut feed = changes.subscribe();
    let (tx, rx) = mpsc::channel(64);
    let (cancel_tx, mut cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = &mut cancel_rx => break,
                ev = feed.recv() => match ev {
                    Ok(ev) => {
                        if tx.send(ev).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    });
    ChangeSubscription::new(rx, cancel_tx)
}

/// In-memory remote collection owned by one account.
pub struct MemoryRemoteCollection<T> {
    owner: UserId,
    docs: Arc<RwLock<HashMap<DocumentId, RemoteDoc<T>>>>,
    changes: broadcast::Sender<ChangeEvent>,
    faults: Arc<Faults>,
}

impl<T: SyncedDocument> MemoryRemoteCollection<T> {
    #[must_use]
    pub fn new(owner: UserId) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            owner,
            docs: Arc::new(RwLock::new(HashMap::new())),
            changes,
            faults: Arc::new(Faults::new()),
        }
    }

    /// Simulates loss of connectivity: every operation fails with a network
    /// error until cleared.
    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes payload fetches and writes for one document fail; metadata
    /// probes stay healthy.
    pub async fn fail_document(&self, id: DocumentId) {
        self.faults.failing.write().await.insert(id);
    }

    /// Clears injected per-document failures.
    pub async fn clear_failures(&self) {
        self.faults.failing.write().await.clear();
    }

    /// Number of writes that were actually applied.
    pub fn write_count(&self) -> usize {
        self.faults.writes.load(Ordering::SeqCst)
    }

    /// Inserts a document as the owning account, as another device would.
    pub async fn seed(&self, item: T) -> SyncResult<()> {
        let scope = PermissionScope::owner(self.owner);
        self.add_or_update_item(item, &scope).await
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    pub async fn contains(&self, id: DocumentId) -> bool {
        self.docs.read().await.contains_key(&id)
    }

    /// The scope a document was created under, if it exists.
    pub async fn scope_of(&self, id: DocumentId) -> Option<PermissionScope> {
        self.docs.read().await.get(&id).map(|d| d.scope.clone())
    }
}

#[async_trait]
impl<T: SyncedDocument> RemoteCollectionSource<T> for MemoryRemoteCollection<T> {
    fn permissions(&self, user: &CurrentUser) -> PermissionScope {
        PermissionScope::owner(user.user_id)
    }

    async fn add_or_update_item(&self, item: T, scope: &PermissionScope) -> SyncResult<()> {
        self.faults.check_online()?;
        let id = item.document_id();
        self.faults.check_document(id).await?;
        if !scope.allows_write(self.owner) {
            return Err(SyncError::Permission(format!(
                "scope does not grant write to collection owner for document {id}"
            )));
        }

        let mut docs = self.docs.write().await;
        let kind = match docs.get(&id) {
            Some(existing) if existing.item.updated_at() > item.updated_at() => return Ok(()),
            Some(_) => ChangeKind::Modified,
            None => ChangeKind::Added,
        };
        docs.insert(
            id,
            RemoteDoc {
                item,
                scope: scope.clone(),
            },
        );
        drop(docs);

        self.faults.writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.changes.send(ChangeEvent {
            document_id: id,
            kind,
        });
        Ok(())
    }

    async fn fetch_item(&self, id: DocumentId) -> SyncResult<Option<T>> {
        self.faults.check_online()?;
        self.faults.check_document(id).await?;
        Ok(self.docs.read().await.get(&id).map(|d| d.item.clone()))
    }

    async fn fetch_all_metadata(&self) -> SyncResult<Vec<MetadataModel>> {
        self.faults.check_online()?;
        Ok(self
            .docs
            .read()
            .await
            .values()
            .map(|d| d.item.metadata())
            .collect())
    }

    async fn fetch_metadata(&self, id: DocumentId) -> SyncResult<Option<MetadataModel>> {
        self.faults.check_online()?;
        Ok(self.docs.read().await.get(&id).map(|d| d.item.metadata()))
    }

    async fn delete_item(&self, id: DocumentId) -> SyncResult<()> {
        self.faults.check_online()?;
        if self.docs.write().await.remove(&id).is_some() {
            let _ = self.changes.send(ChangeEvent {
                document_id: id,
                kind: ChangeKind::Removed,
            });
        }
        Ok(())
    }

    async fn subscribe_to_changes(&self) -> SyncResult<ChangeSubscription> {
        self.faults.check_online()?;
        Ok(spawn_change_feed(&self.changes))
    }
}

/// In-memory remote singleton document owned by one account.
pub struct MemoryRemoteSingle<T> {
    owner: UserId,
    doc: Arc<RwLock<Option<RemoteDoc<T>>>>,
    changes: broadcast::Sender<ChangeEvent>,
    faults: Arc<Faults>,
}

impl<T: SyncedDocument> MemoryRemoteSingle<T> {
    #[must_use]
    pub fn new(owner: UserId) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            owner,
            doc: Arc::new(RwLock::new(None)),
            changes,
            faults: Arc::new(Faults::new()),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.faults.offline.store(offline, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> usize {
        self.faults.writes.load(Ordering::SeqCst)
    }

    /// Inserts the document as the owning account, as another device would.
    pub async fn seed(&self, item: T) -> SyncResult<()> {
        let scope = PermissionScope::owner(self.owner);
        self.add_or_update_item(item, &scope).await
    }

    pub async fn get(&self) -> Option<T> {
        self.doc.read().await.as_ref().map(|d| d.item.clone())
    }
}

#[async_trait]
impl<T: SyncedDocument> RemoteSingleSource<T> for MemoryRemoteSingle<T> {
    fn permissions(&self, user: &CurrentUser) -> PermissionScope {
        PermissionScope::owner(user.user_id)
    }

    async fn add_or_update_item(&self, item: T, scope: &PermissionScope) -> SyncResult<()> {
        self.faults.check_online()?;
        if !scope.allows_write(self.owner) {
            return Err(SyncError::Permission(
                "scope does not grant write to document owner".into(),
            ));
        }

        let id = item.document_id();
        let mut doc = self.doc.write().await;
        let kind = match doc.as_ref() {
            Some(existing) if existing.item.updated_at() > item.updated_at() => return Ok(()),
            Some(_) => ChangeKind::Modified,
            None => ChangeKind::Added,
        };
        *doc = Some(RemoteDoc {
            item,
            scope: scope.clone(),
        });
        drop(doc);

        self.faults.writes.fetch_add(1, Ordering::SeqCst);
        let _ = self.changes.send(ChangeEvent {
            document_id: id,
            kind,
        });
        Ok(())
    }

    async fn fetch_item(&self) -> SyncResult<Option<T>> {
        self.faults.check_online()?;
        Ok(self.doc.read().await.as_ref().map(|d| d.item.clone()))
    }

    async fn fetch_metadata(&self) -> SyncResult<Option<MetadataModel>> {
        self.faults.check_online()?;
        Ok(self.doc.read().await.as_ref().map(|d| d.item.metadata()))
    }

    async fn delete_item(&self) -> SyncResult<()> {
        self.faults.check_online()?;
        let mut doc = self.doc.write().await;
        if let Some(existing) = doc.take() {
            let _ = self.changes.send(ChangeEvent {
                document_id: existing.item.document_id(),
                kind: ChangeKind::Removed,
            });
        }
        Ok(())
    }

    async fn subscribe_to_changes(&self) -> SyncResult<ChangeSubscription> {
        self.faults.check_online()?;
        Ok(spawn_change_feed(&self.changes))
    }
}
