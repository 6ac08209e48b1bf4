//! REST adapter for the hosted document backend.
//!
//! One collection per entity type, documents addressable by id, every write
//! wrapped in an envelope carrying its permission scope. The backend has no
//! server push on this surface, so `subscribe_to_changes` polls the cheap
//! metadata listing and diffs it against the previously seen state.

use crate::error::{SyncError, SyncResult};
use crate::source::{
    ChangeEvent, ChangeKind, ChangeSubscription, CurrentUser, PermissionScope,
    RemoteCollectionSource, RemoteSingleSource,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use studyplan_types::{DocumentId, MetadataModel, SourceSyncKey, SyncedDocument};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Configuration for the REST remote client.
#[derive(Debug, Clone)]
pub struct RestClientConfig {
    /// Base URL of the document backend.
    pub base_url: String,
    /// Bearer token of the authenticated account.
    pub auth_token: Option<String>,
    /// How often change subscriptions poll the metadata listing.
    pub poll_interval: Duration,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.studyplan.app".to_string(),
            auth_token: None,
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Wire envelope for document writes and reads.
#[derive(Serialize, Deserialize)]
struct DocumentEnvelope<T> {
    document: T,
    permissions: PermissionScope,
}

/// Wire shape of one metadata listing row.
#[derive(Debug, Deserialize)]
struct MetadataRow {
    id: DocumentId,
    updated_at: DateTime<Utc>,
}

impl From<MetadataRow> for MetadataModel {
    fn from(row: MetadataRow) -> Self {
        MetadataModel::new(row.id, row.updated_at)
    }
}

fn status_error(status: StatusCode, context: &str) -> SyncError {
    match status.as_u16() {
        401 | 403 => SyncError::Permission(format!("{context}: status {status}")),
        404 => SyncError::NotFound(context.to_string()),
        _ => SyncError::Network(format!("{context}: unexpected status {status}")),
    }
}

struct RestShared {
    client: Client,
    config: RestClientConfig,
}

impl RestShared {
    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.get(url))
    }

    fn put(&self, url: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.put(url))
    }

    fn delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.with_auth(self.client.delete(url))
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// GET returning `None` on 404.
    async fn get_json<R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        context: &str,
    ) -> SyncResult<Option<R>> {
        let resp = self.get(url).send().await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp.json().await?)),
            status => Err(status_error(status, context)),
        }
    }
}

/// Client for the hosted document backend; hands out per-collection sources.
pub struct RestRemoteClient {
    shared: Arc<RestShared>,
}

impl RestRemoteClient {
    pub fn new(config: RestClientConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            shared: Arc::new(RestShared { client, config }),
        })
    }

    /// Remote source for a keyed collection.
    #[must_use]
    pub fn collection<T: SyncedDocument>(&self, key: SourceSyncKey) -> RestCollectionSource<T> {
        RestCollectionSource {
            shared: self.shared.clone(),
            key,
            _marker: PhantomData,
        }
    }

    /// Remote source for a singleton document with a fixed id.
    #[must_use]
    pub fn single<T: SyncedDocument>(
        &self,
        key: SourceSyncKey,
        document_id: DocumentId,
    ) -> RestSingleSource<T> {
        RestSingleSource {
            shared: self.shared.clone(),
            key,
            document_id,
            _marker: PhantomData,
        }
    }
}

/// REST-backed remote source for one collection.
pub struct RestCollectionSource<T> {
    shared: Arc<RestShared>,
    key: SourceSyncKey,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RestCollectionSource<T> {
    fn metadata_url(&self) -> String {
        format!(
            "{}/collections/{}/metadata",
            self.shared.config.base_url, self.key
        )
    }

    fn document_url(&self, id: DocumentId) -> String {
        format!(
            "{}/collections/{}/documents/{}",
            self.shared.config.base_url, self.key, id
        )
    }
}

#[async_trait]
impl<T: SyncedDocument> RemoteCollectionSource<T> for RestCollectionSource<T> {
    fn permissions(&self, user: &CurrentUser) -> PermissionScope {
        PermissionScope::owner(user.user_id)
    }

    async fn add_or_update_item(&self, item: T, scope: &PermissionScope) -> SyncResult<()> {
        let url = self.document_url(item.document_id());
        let envelope = DocumentEnvelope {
            document: item,
            permissions: scope.clone(),
        };
        let resp = self.shared.put(&url).json(&envelope).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, "document write rejected"))
        }
    }

    async fn fetch_item(&self, id: DocumentId) -> SyncResult<Option<T>> {
        let envelope: Option<DocumentEnvelope<T>> = self
            .shared
            .get_json(&self.document_url(id), "document fetch failed")
            .await?;
        Ok(envelope.map(|e| e.document))
    }

    async fn fetch_all_metadata(&self) -> SyncResult<Vec<MetadataModel>> {
        let rows: Vec<MetadataRow> = self
            .shared
            .get_json(&self.metadata_url(), "metadata listing failed")
            .await?
            .unwrap_or_default();
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn fetch_metadata(&self, id: DocumentId) -> SyncResult<Option<MetadataModel>> {
        let url = format!("{}/metadata", self.document_url(id));
        let row: Option<MetadataRow> = self
            .shared
            .get_json(&url, "metadata fetch failed")
            .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_item(&self, id: DocumentId) -> SyncResult<()> {
        let resp = self.shared.delete(&self.document_url(id)).send().await?;
        let status = resp.status();
        // Deleting an already-gone document is not an error.
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(status, "document delete rejected"))
        }
    }

    async fn subscribe_to_changes(&self) -> SyncResult<ChangeSubscription> {
        let shared = self.shared.clone();
        let key = self.key;
        let (tx, rx) = mpsc::channel(64);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();

        tokio::spawn(async move {
            let source = RestCollectionSource::<MetadataProbe> {
                shared: shared.clone(),
                key,
                _marker: PhantomData,
            };
            let mut interval = tokio::time::interval(shared.config.poll_interval);
            // The first listing primes the known set without emitting
            // events; the manager has just reconciled everything anyway.
            let mut known: Option<HashMap<DocumentId, DateTime<Utc>>> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    _ = interval.tick() => {
                        let listing = match source.fetch_all_metadata().await {
                            Ok(rows) => rows,
                            Err(e) => {
                                debug!("change poll for {key} failed: {e}");
                                continue;
                            }
                        };
                        let current: HashMap<_, _> = listing
                            .into_iter()
                            .map(|m| (m.document_id, m.updated_at))
                            .collect();
                        if let Some(previous) = known.replace(current.clone()) {
                            let events = diff_listings(&previous, &current);
                            for ev in events {
                                if tx.send(ev).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(ChangeSubscription::new(rx, cancel_tx))
    }
}

/// Computes change events between two metadata listings.
fn diff_listings(
    previous: &HashMap<DocumentId, DateTime<Utc>>,
    current: &HashMap<DocumentId, DateTime<Utc>>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    for (id, updated_at) in current {
        match previous.get(id) {
            None => events.push(ChangeEvent {
                document_id: *id,
                kind: ChangeKind::Added,
            }),
            Some(prev) if prev != updated_at => events.push(ChangeEvent {
                document_id: *id,
                kind: ChangeKind::Modified,
            }),
            Some(_) => {}
        }
    }
    for id in previous.keys() {
        if !current.contains_key(id) {
            events.push(ChangeEvent {
                document_id: *id,
                kind: ChangeKind::Removed,
            });
        }
    }
    events
}

/// Minimal document shape matching the listing rows, so the poll task can
/// reuse the collection source without knowing the real payload type.
#[derive(Clone, Serialize, Deserialize)]
struct MetadataProbe {
    id: DocumentId,
    updated_at: DateTime<Utc>,
}

impl SyncedDocument for MetadataProbe {
    fn document_id(&self) -> DocumentId {
        self.id
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

/// REST-backed remote source for one singleton document.
pub struct RestSingleSource<T> {
    shared: Arc<RestShared>,
    key: SourceSyncKey,
    document_id: DocumentId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RestSingleSource<T> {
    fn document_url(&self) -> String {
        format!(
            "{}/collections/{}/documents/{}",
            self.shared.config.base_url, self.key, self.document_id
        )
    }
}

#[async_trait]
impl<T: SyncedDocument> RemoteSingleSource<T> for RestSingleSource<T> {
    fn permissions(&self, user: &CurrentUser) -> PermissionScope {
        PermissionScope::owner(user.user_id)
    }

    async fn add_or_update_item(&self, item: T, scope: &PermissionScope) -> SyncResult<()> {
        let envelope = DocumentEnvelope {
            document: item,
            permissions: scope.clone(),
        };
        let resp = self
            .shared
            .put(&self.document_url())
            .json(&envelope)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(status_error(status, "document write rejected"))
        }
    }

    async fn fetch_item(&self) -> SyncResult<Option<T>> {
        let envelope: Option<DocumentEnvelope<T>> = self
            .shared
            .get_json(&self.document_url(), "document fetch failed")
            .await?;
        Ok(envelope.map(|e| e.document))
    }

    async fn fetch_metadata(&self) -> SyncResult<Option<MetadataModel>> {
        let url = format!("{}/metadata", self.document_url());
        let row: Option<MetadataRow> = self
            .shared
            .get_json(&url, "metadata fetch failed")
            .await?;
        Ok(row.map(Into::into))
    }

    async fn delete_item(&self) -> SyncResult<()> {
        let resp = self.shared.delete(&self.document_url()).send().await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(status_error(status, "document delete rejected"))
        }
    }

    async fn subscribe_to_changes(&self) -> SyncResult<ChangeSubscription> {
        let shared = self.shared.clone();
        let key = self.key;
        let document_id = self.document_id;
        let (tx, rx) = mpsc::channel(16);
        let (cancel_tx, mut cancel_rx) = oneshot::channel();

        tokio::spawn(async move {
            let url = format!(
                "{}/collections/{}/documents/{}/metadata",
                shared.config.base_url, key, document_id
            );
            let mut interval = tokio::time::interval(shared.config.poll_interval);
            let mut known: Option<Option<DateTime<Utc>>> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_rx => break,
                    _ = interval.tick() => {
                        let row: Option<MetadataRow> =
                            match shared.get_json(&url, "metadata poll failed").await {
                                Ok(row) => row,
                                Err(e) => {
                                    debug!("change poll for {key} failed: {e}");
                                    continue;
                                }
                            };
                        let current = row.map(|r| r.updated_at);
                        if let Some(previous) = known.replace(current) {
                            let kind = match (previous, current) {
                                (None, Some(_)) => Some(ChangeKind::Added),
                                (Some(p), Some(c)) if p != c => Some(ChangeKind::Modified),
                                (Some(_), None) => Some(ChangeKind::Removed),
                                _ => None,
                            };
                            if let Some(kind) = kind {
                                if tx.send(ChangeEvent { document_id, kind }).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(ChangeSubscription::new(rx, cancel_tx))
    }
}
