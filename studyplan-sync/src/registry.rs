//! Explicit sync-source registry.
//!
//! Built once at process start: one manager per entity type, bound to its
//! fixed local/remote pair, then frozen into a [`SyncFacade`]. No runtime
//! registration; the full set of sources is known at startup.

use crate::error::SyncResult;
use crate::facade::SyncFacade;
use crate::local::LocalDatabase;
use crate::manager::{CollectionSyncManager, SingleSyncManager, SourceSyncManager};
use crate::remote::rest::RestRemoteClient;
use crate::source::{
    CurrentUser, LocalCollectionSource, LocalSingleSource, RemoteCollectionSource,
    RemoteSingleSource,
};
use std::sync::Arc;
use studyplan_types::{
    AiUsage, Employee, FriendRequest, Goal, Homework, Organization, Schedule, ScheduleInvitation,
    SourceSyncKey, Subject, Todo, SyncedDocument, keys,
};

/// Builder collecting managers before freezing them into a facade.
#[derive(Default)]
pub struct SyncRegistry {
    managers: Vec<Arc<dyn SourceSyncManager>>,
}

impl SyncRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-constructed manager.
    pub fn register(&mut self, manager: Arc<dyn SourceSyncManager>) -> &mut Self {
        self.managers.push(manager);
        self
    }

    /// Registers a collection manager for the given pair of sources.
    pub fn register_collection<T: SyncedDocument>(
        &mut self,
        key: SourceSyncKey,
        user: CurrentUser,
        local: Arc<dyn LocalCollectionSource<T>>,
        remote: Arc<dyn RemoteCollectionSource<T>>,
    ) -> &mut Self {
        self.register(Arc::new(CollectionSyncManager::new(key, user, local, remote)))
    }

    /// Registers a single-document manager for the given pair of sources.
    pub fn register_single<T: SyncedDocument>(
        &mut self,
        key: SourceSyncKey,
        user: CurrentUser,
        local: Arc<dyn LocalSingleSource<T>>,
        remote: Arc<dyn RemoteSingleSource<T>>,
    ) -> &mut Self {
        self.register(Arc::new(SingleSyncManager::new(key, user, local, remote)))
    }

    /// Freezes the registry into a facade.
    #[must_use]
    pub fn into_facade(self) -> SyncFacade {
        SyncFacade::new(self.managers)
    }
}

/// Wires every application collection to the shared local database and the
/// hosted backend, returning the complete facade.
pub fn build_sync_facade(
    db: &LocalDatabase,
    remote: &RestRemoteClient,
    user: CurrentUser,
) -> SyncResult<SyncFacade> {
    let mut registry = SyncRegistry::new();

    wire_collection::<Schedule>(&mut registry, db, remote, user, keys::SCHEDULES)?;
    wire_collection::<Homework>(&mut registry, db, remote, user, keys::HOMEWORK)?;
    wire_collection::<Todo>(&mut registry, db, remote, user, keys::TODOS)?;
    wire_collection::<Goal>(&mut registry, db, remote, user, keys::GOALS)?;
    wire_collection::<Organization>(&mut registry, db, remote, user, keys::ORGANIZATIONS)?;
    wire_collection::<Subject>(&mut registry, db, remote, user, keys::SUBJECTS)?;
    wire_collection::<Employee>(&mut registry, db, remote, user, keys::EMPLOYEES)?;
    wire_collection::<ScheduleInvitation>(
        &mut registry,
        db,
        remote,
        user,
        keys::SCHEDULE_INVITATIONS,
    )?;
    wire_collection::<FriendRequest>(&mut registry, db, remote, user, keys::FRIEND_REQUESTS)?;

    // The AI usage counter is one document per account, keyed off the
    // user id so every device and the backend agree on its identity.
    let local = Arc::new(db.single::<AiUsage>(keys::AI_USAGE)?);
    let remote_single =
        Arc::new(remote.single::<AiUsage>(keys::AI_USAGE, AiUsage::document_id_for(user.user_id)));
    registry.register_single(keys::AI_USAGE, user, local, remote_single);

    Ok(registry.into_facade())
}

fn wire_collection<T: SyncedDocument>(
    registry: &mut SyncRegistry,
    db: &LocalDatabase,
    remote: &RestRemoteClient,
    user: CurrentUser,
    key: SourceSyncKey,
) -> SyncResult<()> {
    let local = Arc::new(db.collection::<T>(key)?);
    let remote = Arc::new(remote.collection::<T>(key));
    registry.register_collection(key, user, local, remote);
    Ok(())
}
