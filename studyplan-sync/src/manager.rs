//! Per-entity sync managers.
//!
//! One manager owns one local/remote source pair and drives the
//! metadata-first reconciliation between them. Managers are generic over the
//! payload type; the per-entity differences live entirely in configuration
//! (source key, adapters, permission rule on the remote side).
//!
//! Lifecycle: `Idle → Syncing → Listening → Stopped`, with `Syncing`
//! re-entered from `Listening` on every push event or explicit round, and
//! `Stopped` reachable from anywhere. A failed initial pass leaves the
//! manager listening in a degraded state; the next push event or periodic
//! round retries naturally.

use crate::error::SyncResult;
use crate::source::{
    CurrentUser, LocalCollectionSource, LocalSingleSource, RemoteCollectionSource,
    RemoteSingleSource,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use studyplan_types::{DocumentId, MetadataModel, SourceSyncKey, SyncDecision, SyncedDocument, compare};
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle state of a sync manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncLifecycle {
    /// Constructed, never started.
    Idle,
    /// A reconciliation pass is in flight.
    Syncing,
    /// Steady state: holding an open remote change subscription.
    Listening,
    /// Stopped; the subscription task has exited.
    Stopped,
}

/// Object-safe contract every per-entity manager satisfies; the facade fans
/// out over a list of these.
#[async_trait]
pub trait SourceSyncManager: Send + Sync {
    /// The source key this manager is registered under.
    fn key(&self) -> SourceSyncKey;

    /// Current lifecycle state.
    async fn lifecycle(&self) -> SyncLifecycle;

    /// Starts continuous sync: one full pass, then listen for remote
    /// changes. Returns as soon as the background task is spawned.
    async fn start_source_sync(&self);

    /// Runs exactly one full reconciliation pass and reports whether it
    /// completed without error. Does not alter subscription state.
    async fn single_sync_round(&self) -> bool;

    /// Cancels the change subscription and awaits the listener task.
    /// Idempotent.
    async fn stop_source_sync(&self);

    /// Deletes all local rows owned by this manager. Never touches remote
    /// data.
    async fn clear_source_data(&self) -> SyncResult<()>;
}

struct ListenerHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

// ── Collection manager ───────────────────────────────────────────

struct CollectionInner<T: SyncedDocument> {
    key: SourceSyncKey,
    user: CurrentUser,
    local: Arc<dyn LocalCollectionSource<T>>,
    remote: Arc<dyn RemoteCollectionSource<T>>,
    lifecycle: RwLock<SyncLifecycle>,
    /// Serializes reconciliation passes within this manager, so a push event
    /// for an id already being reconciled queues instead of interleaving.
    pass_lock: Mutex<()>,
    listener: Mutex<Option<ListenerHandle>>,
}

/// Sync manager for a keyed document collection.
pub struct CollectionSyncManager<T: SyncedDocument> {
    inner: Arc<CollectionInner<T>>,
}

impl<T: SyncedDocument> Clone for CollectionSyncManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: SyncedDocument> CollectionSyncManager<T> {
    pub fn new(
        key: SourceSyncKey,
        user: CurrentUser,
        local: Arc<dyn LocalCollectionSource<T>>,
        remote: Arc<dyn RemoteCollectionSource<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                key,
                user,
                local,
                remote,
                lifecycle: RwLock::new(SyncLifecycle::Idle),
                pass_lock: Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Deletes a document on both sides. Remote first, so a failure leaves
    /// the pair intact and retryable rather than resurrectable.
    pub async fn delete_document(&self, id: DocumentId) -> SyncResult<()> {
        let _guard = self.inner.pass_lock.lock().await;
        self.inner.remote.delete_item(id).await?;
        self.inner.local.delete_item(id).await
    }
}

impl<T: SyncedDocument> CollectionInner<T> {
    async fn set_lifecycle(&self, state: SyncLifecycle) {
        *self.lifecycle.write().await = state;
    }

    /// One full pass over the union of local and remote ids. Per-id failures
    /// are collected, never propagated, so the rest of the pass commits.
    async fn reconcile_all(&self) -> bool {
        let _guard = self.pass_lock.lock().await;
        let (local_meta, remote_meta) = tokio::join!(
            self.local.fetch_all_metadata(),
            self.remote.fetch_all_metadata()
        );
        let local_meta = match local_meta {
            Ok(meta) => meta,
            Err(e) => {
                warn!("local metadata probe failed for {}: {e}", self.key);
                return false;
            }
        };
        let remote_meta = match remote_meta {
            Ok(meta) => meta,
            Err(e) => {
                warn!("remote metadata probe failed for {}: {e}", self.key);
                return false;
            }
        };

        let mut by_id: BTreeMap<DocumentId, (Option<MetadataModel>, Option<MetadataModel>)> =
            BTreeMap::new();
        for meta in local_meta {
            by_id.entry(meta.document_id).or_default().0 = Some(meta);
        }
        for meta in remote_meta {
            by_id.entry(meta.document_id).or_default().1 = Some(meta);
        }

        let total = by_id.len();
        let mut failed = 0usize;
        for (id, (local, remote)) in by_id {
            if let Err(e) = self.reconcile_id(id, local.as_ref(), remote.as_ref()).await {
                warn!("reconciliation of {id} failed for {}: {e}", self.key);
                failed += 1;
            }
        }

        if failed > 0 {
            warn!("sync pass for {} finished with {failed}/{total} failures", self.key);
        } else {
            debug!("sync pass for {} reconciled {total} documents", self.key);
        }
        failed == 0
    }

    /// Reconciles a single id, used for push-triggered passes.
    async fn reconcile_one(&self, id: DocumentId) -> SyncResult<()> {
        let _guard = self.pass_lock.lock().await;
        let (local, remote) = tokio::join!(
            self.local.fetch_metadata(id),
            self.remote.fetch_metadata(id)
        );
        let local = local?;
        let remote = remote?;
        self.reconcile_id(id, local.as_ref(), remote.as_ref()).await
    }

    async fn reconcile_id(
        &self,
        id: DocumentId,
        local: Option<&MetadataModel>,
        remote: Option<&MetadataModel>,
    ) -> SyncResult<()> {
        match compare(local, remote) {
            SyncDecision::Equal | SyncDecision::BothAbsent => Ok(()),
            SyncDecision::UseRemote => self.pull(id, local).await,
            SyncDecision::UseLocal => self.push(id).await,
        }
    }

    /// Pulls the remote payload into the local store. A document that
    /// vanished between probe and fetch means remote is now absent, so the
    /// comparator is re-applied against that reality.
    async fn pull(&self, id: DocumentId, local_meta: Option<&MetadataModel>) -> SyncResult<()> {
        let fetched = match self.remote.fetch_item(id).await {
            Ok(item) => item,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        match fetched {
            Some(item) => self.local.add_or_update_item(item).await,
            None => match compare(local_meta, None) {
                SyncDecision::UseLocal => self.push(id).await,
                _ => Ok(()),
            },
        }
    }

    /// Pushes the local payload to the remote store under the permission
    /// scope of the current account.
    async fn push(&self, id: DocumentId) -> SyncResult<()> {
        let Some(item) = self.local.fetch_item(id).await? else {
            // Vanished since the probe; nothing to push.
            return Ok(());
        };
        let scope = self.remote.permissions(&self.user);
        self.remote.add_or_update_item(item, &scope).await
    }

    async fn run_listener(self: Arc<Self>, mut stop_rx: oneshot::Receiver<()>) {
        self.set_lifecycle(SyncLifecycle::Syncing).await;
        if !self.reconcile_all().await {
            warn!(
                "initial sync pass for {} reported failures, listening in degraded state",
                self.key
            );
        }

        let sub = match self.remote.subscribe_to_changes().await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!("failed to open change subscription for {}: {e}", self.key);
                None
            }
        };
        self.set_lifecycle(SyncLifecycle::Listening).await;

        match sub {
            Some(mut sub) => loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        sub.cancel();
                        break;
                    }
                    ev = sub.recv() => match ev {
                        Some(ev) => {
                            self.set_lifecycle(SyncLifecycle::Syncing).await;
                            if let Err(e) = self.reconcile_one(ev.document_id).await {
                                warn!(
                                    "push-triggered reconcile of {} failed for {}: {e}",
                                    ev.document_id, self.key
                                );
                            }
                            self.set_lifecycle(SyncLifecycle::Listening).await;
                        }
                        None => {
                            debug!("change feed for {} closed", self.key);
                            break;
                        }
                    }
                }
            },
            // Degraded: no push events until restarted; periodic rounds
            // still reconcile this source.
            None => {
                let _ = stop_rx.await;
            }
        }

        self.set_lifecycle(SyncLifecycle::Stopped).await;
    }
}

#[async_trait]
impl<T: SyncedDocument> SourceSyncManager for CollectionSyncManager<T> {
    fn key(&self) -> SourceSyncKey {
        self.inner.key
    }

    async fn lifecycle(&self) -> SyncLifecycle {
        *self.inner.lifecycle.read().await
    }

    async fn start_source_sync(&self) {
        let mut listener = self.inner.listener.lock().await;
        if listener.is_some() {
            debug!("{} is already syncing", self.inner.key);
            return;
        }
        info!("starting sync for {}", self.inner.key);
        let (stop_tx, stop_rx) = oneshot::channel();
        let inner = self.inner.clone();
        let task = tokio::spawn(inner.run_listener(stop_rx));
        *listener = Some(ListenerHandle { stop_tx, task });
    }

    async fn single_sync_round(&self) -> bool {
        self.inner.reconcile_all().await
    }

    async fn stop_source_sync(&self) {
        let handle = self.inner.listener.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(());
            if let Err(e) = handle.task.await {
                warn!("listener task for {} ended abnormally: {e}", self.inner.key);
            }
        }
        self.inner.set_lifecycle(SyncLifecycle::Stopped).await;
    }

    async fn clear_source_data(&self) -> SyncResult<()> {
        let _guard = self.inner.pass_lock.lock().await;
        info!("clearing local data for {}", self.inner.key);
        self.inner.local.clear().await
    }
}

// ── Single-document manager ──────────────────────────────────────

struct SingleInner<T: SyncedDocument> {
    key: SourceSyncKey,
    user: CurrentUser,
    local: Arc<dyn LocalSingleSource<T>>,
    remote: Arc<dyn RemoteSingleSource<T>>,
    lifecycle: RwLock<SyncLifecycle>,
    pass_lock: Mutex<()>,
    listener: Mutex<Option<ListenerHandle>>,
}

/// Sync manager for a singleton per-account document.
pub struct SingleSyncManager<T: SyncedDocument> {
    inner: Arc<SingleInner<T>>,
}

impl<T: SyncedDocument> Clone for SingleSyncManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: SyncedDocument> SingleSyncManager<T> {
    pub fn new(
        key: SourceSyncKey,
        user: CurrentUser,
        local: Arc<dyn LocalSingleSource<T>>,
        remote: Arc<dyn RemoteSingleSource<T>>,
    ) -> Self {
        Self {
            inner: Arc::new(SingleInner {
                key,
                user,
                local,
                remote,
                lifecycle: RwLock::new(SyncLifecycle::Idle),
                pass_lock: Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Deletes the document on both sides. Remote first.
    pub async fn delete_document(&self) -> SyncResult<()> {
        let _guard = self.inner.pass_lock.lock().await;
        self.inner.remote.delete_item().await?;
        self.inner.local.delete_item().await
    }
}

impl<T: SyncedDocument> SingleInner<T> {
    async fn set_lifecycle(&self, state: SyncLifecycle) {
        *self.lifecycle.write().await = state;
    }

    async fn reconcile(&self) -> bool {
        let _guard = self.pass_lock.lock().await;
        match self.reconcile_pass().await {
            Ok(()) => true,
            Err(e) => {
                warn!("sync pass failed for {}: {e}", self.key);
                false
            }
        }
    }

    async fn reconcile_pass(&self) -> SyncResult<()> {
        let (local, remote) =
            tokio::join!(self.local.fetch_metadata(), self.remote.fetch_metadata());
        let local = local?;
        let remote = remote?;

        match compare(local.as_ref(), remote.as_ref()) {
            SyncDecision::Equal | SyncDecision::BothAbsent => Ok(()),
            SyncDecision::UseRemote => self.pull(local.as_ref()).await,
            SyncDecision::UseLocal => self.push().await,
        }
    }

    async fn pull(&self, local_meta: Option<&MetadataModel>) -> SyncResult<()> {
        let fetched = match self.remote.fetch_item().await {
            Ok(item) => item,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        match fetched {
            Some(item) => self.local.add_or_update_item(item).await,
            None => match compare(local_meta, None) {
                SyncDecision::UseLocal => self.push().await,
                _ => Ok(()),
            },
        }
    }

    async fn push(&self) -> SyncResult<()> {
        let Some(item) = self.local.fetch_item().await? else {
            return Ok(());
        };
        let scope = self.remote.permissions(&self.user);
        self.remote.add_or_update_item(item, &scope).await
    }

    async fn run_listener(self: Arc<Self>, mut stop_rx: oneshot::Receiver<()>) {
        self.set_lifecycle(SyncLifecycle::Syncing).await;
        if !self.reconcile().await {
            warn!(
                "initial sync pass for {} reported failures, listening in degraded state",
                self.key
            );
        }

        let sub = match self.remote.subscribe_to_changes().await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!("failed to open change subscription for {}: {e}", self.key);
                None
            }
        };
        self.set_lifecycle(SyncLifecycle::Listening).await;

        match sub {
            Some(mut sub) => loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        sub.cancel();
                        break;
                    }
                    ev = sub.recv() => match ev {
                        // Any event means re-reconcile the whole document.
                        Some(_) => {
                            self.set_lifecycle(SyncLifecycle::Syncing).await;
                            self.reconcile().await;
                            self.set_lifecycle(SyncLifecycle::Listening).await;
                        }
                        None => {
                            debug!("change feed for {} closed", self.key);
                            break;
                        }
                    }
                }
            },
            None => {
                let _ = stop_rx.await;
            }
        }

        self.set_lifecycle(SyncLifecycle::Stopped).await;
    }
}

#[async_trait]
impl<T: SyncedDocument> SourceSyncManager for SingleSyncManager<T> {
    fn key(&self) -> SourceSyncKey {
        self.inner.key
    }

    async fn lifecycle(&self) -> SyncLifecycle {
        *self.inner.lifecycle.read().await
    }

    async fn start_source_sync(&self) {
        let mut listener = self.inner.listener.lock().await;
        if listener.is_some() {
            debug!("{} is already syncing", self.inner.key);
            return;
        }
        info!("starting sync for {}", self.inner.key);
        let (stop_tx, stop_rx) = oneshot::channel();
        let inner = self.inner.clone();
        let task = tokio::spawn(inner.run_listener(stop_rx));
        *listener = Some(ListenerHandle { stop_tx, task });
    }

    async fn single_sync_round(&self) -> bool {
        self.inner.reconcile().await
    }

    async fn stop_source_sync(&self) {
        let handle = self.inner.listener.lock().await.take();
        if let Some(handle) = handle {
            let _ = handle.stop_tx.send(());
            if let Err(e) = handle.task.await {
                warn!("listener task for {} ended abnormally: {e}", self.inner.key);
            }
        }
        self.inner.set_lifecycle(SyncLifecycle::Stopped).await;
    }

    async fn clear_source_data(&self) -> SyncResult<()> {
        let _guard = self.inner.pass_lock.lock().await;
        info!("clearing local data for {}", self.inner.key);
        self.inner.local.delete_item().await
    }
}
