//! Synchronization engine for studyplan collections.
//!
//! Keeps the embedded local store and the hosted document backend consistent
//! for every user-owned collection while the device is intermittently
//! connected.
//!
//! # Architecture
//!
//! - **Sources**: narrow local/remote store contracts in two shapes,
//!   singleton document and keyed collection ([`source`])
//! - **Managers**: one generic manager per entity type running the
//!   metadata-first, last-write-wins reconciliation ([`manager`])
//! - **Facade**: fans operations out across all registered managers with
//!   isolated failure semantics ([`facade`])
//! - **Service**: background loop serving periodic rounds and "sync now"
//!   ([`service`])
//!
//! # Sync pass
//!
//! 1. Probe metadata on both sides (cheap, payload-free)
//! 2. Compare per id: strictly newer timestamp wins, present beats absent
//! 3. Pull the remote payload or push the local one accordingly
//! 4. Collect per-id failures without aborting the rest of the pass
//!
//! After the initial pass a manager keeps a change subscription open and
//! re-reconciles affected ids as events arrive.

mod error;
mod facade;
mod local;
mod manager;
pub mod remote;
mod registry;
mod service;
mod source;

pub use error::{SyncError, SyncResult};
pub use facade::SyncFacade;
pub use local::{LocalDatabase, SqliteCollectionStore, SqliteSingleStore};
pub use manager::{CollectionSyncManager, SingleSyncManager, SourceSyncManager, SyncLifecycle};
pub use registry::{SyncRegistry, build_sync_facade};
pub use remote::memory::{MemoryRemoteCollection, MemoryRemoteSingle};
pub use remote::rest::{RestClientConfig, RestCollectionSource, RestRemoteClient, RestSingleSource};
pub use service::{
    RepeatWorkStatus, SyncCommand, SyncService, SyncServiceHandle, SyncWorkManager,
    create_sync_service,
};
pub use source::{
    ChangeEvent, ChangeKind, ChangeSubscription, CurrentUser, LocalCollectionSource,
    LocalSingleSource, Permission, PermissionGrant, PermissionScope, RemoteCollectionSource,
    RemoteSingleSource,
};
