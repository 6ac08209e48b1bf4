use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use studyplan_sync::{
    CollectionSyncManager, LocalCollectionSource, LocalDatabase, LocalSingleSource,
    MemoryRemoteCollection, MemoryRemoteSingle, SingleSyncManager, SourceSyncManager,
    SqliteCollectionStore, SqliteSingleStore, SyncLifecycle,
};
use studyplan_sync::{CurrentUser, RemoteCollectionSource};
use studyplan_types::{AiUsage, Todo, UserId, keys};
use tokio::time::sleep;

fn ts(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

fn todo(title: &str, millis: i64) -> Todo {
    let mut t = Todo::new(title);
    t.updated_at = ts(millis);
    t
}

struct Fixture {
    manager: CollectionSyncManager<Todo>,
    local: Arc<SqliteCollectionStore<Todo>>,
    remote: Arc<MemoryRemoteCollection<Todo>>,
    user: CurrentUser,
}

fn fixture() -> Fixture {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let user = CurrentUser::new(UserId::new());
    let db = LocalDatabase::open_in_memory().unwrap();
    let local = Arc::new(db.collection::<Todo>(keys::TODOS).unwrap());
    let remote = Arc::new(MemoryRemoteCollection::new(user.user_id));
    let manager =
        CollectionSyncManager::new(keys::TODOS, user, local.clone(), remote.clone());
    Fixture {
        manager,
        local,
        remote,
        user,
    }
}

async fn wait_for_lifecycle(manager: &CollectionSyncManager<Todo>, want: SyncLifecycle) {
    for _ in 0..300 {
        if manager.lifecycle().await == want {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("manager never reached {want:?}");
}

// ── Single rounds ────────────────────────────────────────────────

#[tokio::test]
async fn newer_remote_version_is_pulled() {
    let f = fixture();
    let local_version = todo("draft", 100);
    f.local.add_or_update_item(local_version.clone()).await.unwrap();

    let mut remote_version = local_version.clone();
    remote_version.title = "revised on another device".into();
    remote_version.updated_at = ts(200);
    f.remote.seed(remote_version.clone()).await.unwrap();

    assert!(f.manager.single_sync_round().await);

    let stored = f.local.fetch_item(local_version.id).await.unwrap().unwrap();
    assert_eq!(stored, remote_version);
}

#[tokio::test]
async fn local_only_document_is_pushed_under_owner_scope() {
    let f = fixture();
    let item = todo("only on this device", 100);
    f.local.add_or_update_item(item.clone()).await.unwrap();

    assert!(f.manager.single_sync_round().await);

    assert!(f.remote.contains(item.id).await);
    let scope = f.remote.scope_of(item.id).await.unwrap();
    assert!(scope.allows_write(f.user.user_id));
}

#[tokio::test]
async fn newer_local_version_is_pushed() {
    let f = fixture();
    let stale_remote = todo("old", 100);
    f.remote.seed(stale_remote.clone()).await.unwrap();

    let mut newer_local = stale_remote.clone();
    newer_local.title = "edited offline".into();
    newer_local.updated_at = ts(300);
    f.local.add_or_update_item(newer_local.clone()).await.unwrap();

    assert!(f.manager.single_sync_round().await);

    let remote_meta = f
        .remote
        .fetch_metadata(stale_remote.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remote_meta.updated_at, ts(300));
    // Local side untouched by its own push.
    let local = f.local.fetch_item(newer_local.id).await.unwrap().unwrap();
    assert_eq!(local, newer_local);
}

#[tokio::test]
async fn sub_millisecond_timestamps_still_settle() {
    let f = fixture();
    let mut item = todo("stamped by the wall clock", 100);
    item.updated_at = item.updated_at + chrono::Duration::nanoseconds(123_456);
    f.local.add_or_update_item(item.clone()).await.unwrap();

    assert!(f.manager.single_sync_round().await);

    // Both sides must report the exact same freshness after the push,
    // otherwise every later round would re-transfer the document.
    let local_meta = f.local.fetch_metadata(item.id).await.unwrap().unwrap();
    let remote_meta = f.remote.fetch_metadata(item.id).await.unwrap().unwrap();
    assert_eq!(local_meta, remote_meta);

    let writes = f.remote.write_count();
    assert!(f.manager.single_sync_round().await);
    assert_eq!(f.remote.write_count(), writes);
}

#[tokio::test]
async fn settled_pair_produces_no_writes() {
    let f = fixture();
    let item = todo("in sync", 100);
    f.local.add_or_update_item(item.clone()).await.unwrap();
    f.remote.seed(item).await.unwrap();
    let writes_before = f.remote.write_count();

    assert!(f.manager.single_sync_round().await);
    assert!(f.manager.single_sync_round().await);

    assert_eq!(f.remote.write_count(), writes_before);
}

#[tokio::test]
async fn per_document_failure_does_not_abort_the_pass() {
    let f = fixture();
    let healthy = todo("healthy", 100);
    let poisoned = todo("poisoned", 100);
    f.local.add_or_update_item(healthy.clone()).await.unwrap();
    f.local.add_or_update_item(poisoned.clone()).await.unwrap();
    f.remote.fail_document(poisoned.id).await;

    assert!(!f.manager.single_sync_round().await);

    // The healthy document still made it across.
    assert!(f.remote.contains(healthy.id).await);
    assert!(!f.remote.contains(poisoned.id).await);

    f.remote.clear_failures().await;
    assert!(f.manager.single_sync_round().await);
    assert!(f.remote.contains(poisoned.id).await);
}

#[tokio::test]
async fn failed_remote_payload_fetch_leaves_local_intact() {
    let f = fixture();
    let local_version = todo("local", 100);
    f.local.add_or_update_item(local_version.clone()).await.unwrap();

    let mut remote_version = local_version.clone();
    remote_version.updated_at = ts(200);
    f.remote.seed(remote_version).await.unwrap();
    // Metadata probes succeed, the payload fetch fails.
    f.remote.fail_document(local_version.id).await;

    assert!(!f.manager.single_sync_round().await);

    let stored = f.local.fetch_item(local_version.id).await.unwrap().unwrap();
    assert_eq!(stored, local_version);
}

#[tokio::test]
async fn offline_remote_fails_the_round_without_local_damage() {
    let f = fixture();
    let item = todo("kept", 100);
    f.local.add_or_update_item(item.clone()).await.unwrap();
    f.remote.set_offline(true);

    assert!(!f.manager.single_sync_round().await);
    assert_eq!(f.local.fetch_item(item.id).await.unwrap(), Some(item));

    f.remote.set_offline(false);
    assert!(f.manager.single_sync_round().await);
}

// ── Clearing and deleting ────────────────────────────────────────

#[tokio::test]
async fn clear_source_data_leaves_the_remote_untouched() {
    let f = fixture();
    for i in 0i64..5 {
        f.local
            .add_or_update_item(todo(&format!("item {i}"), 100 + i))
            .await
            .unwrap();
    }
    assert!(f.manager.single_sync_round().await);
    assert_eq!(f.remote.len().await, 5);

    f.manager.clear_source_data().await.unwrap();

    assert!(f.local.fetch_all().await.unwrap().is_empty());
    assert_eq!(f.remote.len().await, 5);

    // The next pass pulls everything back.
    assert!(f.manager.single_sync_round().await);
    assert_eq!(f.local.fetch_all().await.unwrap().len(), 5);
}

#[tokio::test]
async fn delete_document_removes_both_sides() {
    let f = fixture();
    let item = todo("to remove", 100);
    f.local.add_or_update_item(item.clone()).await.unwrap();
    assert!(f.manager.single_sync_round().await);
    assert!(f.remote.contains(item.id).await);

    f.manager.delete_document(item.id).await.unwrap();

    assert!(!f.remote.contains(item.id).await);
    assert_eq!(f.local.fetch_item(item.id).await.unwrap(), None);

    // A later round must not resurrect it.
    assert!(f.manager.single_sync_round().await);
    assert!(!f.remote.contains(item.id).await);
    assert_eq!(f.local.fetch_item(item.id).await.unwrap(), None);
}

// ── Continuous sync ──────────────────────────────────────────────

#[tokio::test]
async fn start_runs_the_initial_pass_and_listens() {
    let f = fixture();
    let remote_item = todo("from another device", 100);
    f.remote.seed(remote_item.clone()).await.unwrap();

    f.manager.start_source_sync().await;
    wait_for_lifecycle(&f.manager, SyncLifecycle::Listening).await;

    let stored = f.local.fetch_item(remote_item.id).await.unwrap();
    assert_eq!(stored, Some(remote_item));

    f.manager.stop_source_sync().await;
    assert_eq!(f.manager.lifecycle().await, SyncLifecycle::Stopped);
}

#[tokio::test]
async fn push_event_triggers_a_targeted_pull() {
    let f = fixture();
    f.manager.start_source_sync().await;
    wait_for_lifecycle(&f.manager, SyncLifecycle::Listening).await;

    let item = todo("appeared while listening", 100);
    f.remote.seed(item.clone()).await.unwrap();

    let mut pulled = None;
    for _ in 0..300 {
        if let Some(found) = f.local.fetch_item(item.id).await.unwrap() {
            pulled = Some(found);
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pulled, Some(item));

    f.manager.stop_source_sync().await;
}

#[tokio::test]
async fn no_events_are_applied_after_stop() {
    let f = fixture();
    f.manager.start_source_sync().await;
    wait_for_lifecycle(&f.manager, SyncLifecycle::Listening).await;
    f.manager.stop_source_sync().await;

    let item = todo("arrived too late", 100);
    f.remote.seed(item.clone()).await.unwrap();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(f.local.fetch_item(item.id).await.unwrap(), None);
    assert_eq!(f.manager.lifecycle().await, SyncLifecycle::Stopped);
}

#[tokio::test]
async fn stop_is_idempotent_and_start_twice_spawns_once() {
    let f = fixture();
    f.manager.start_source_sync().await;
    f.manager.start_source_sync().await;
    wait_for_lifecycle(&f.manager, SyncLifecycle::Listening).await;

    f.manager.stop_source_sync().await;
    f.manager.stop_source_sync().await;
    assert_eq!(f.manager.lifecycle().await, SyncLifecycle::Stopped);
}

#[tokio::test]
async fn failed_start_degrades_to_listening_instead_of_dying() {
    let f = fixture();
    f.remote.set_offline(true);

    f.manager.start_source_sync().await;
    wait_for_lifecycle(&f.manager, SyncLifecycle::Listening).await;

    // Connectivity returns; the periodic round path recovers the source.
    f.remote.set_offline(false);
    let item = todo("after recovery", 100);
    f.local.add_or_update_item(item.clone()).await.unwrap();
    assert!(f.manager.single_sync_round().await);
    assert!(f.remote.contains(item.id).await);

    f.manager.stop_source_sync().await;
}

// ── Singleton manager ────────────────────────────────────────────

struct SingleFixture {
    manager: SingleSyncManager<AiUsage>,
    local: Arc<SqliteSingleStore<AiUsage>>,
    remote: Arc<MemoryRemoteSingle<AiUsage>>,
    user: CurrentUser,
}

fn single_fixture() -> SingleFixture {
    let user = CurrentUser::new(UserId::new());
    let db = LocalDatabase::open_in_memory().unwrap();
    let local = Arc::new(db.single::<AiUsage>(keys::AI_USAGE).unwrap());
    let remote = Arc::new(MemoryRemoteSingle::new(user.user_id));
    let manager =
        SingleSyncManager::new(keys::AI_USAGE, user, local.clone(), remote.clone());
    SingleFixture {
        manager,
        local,
        remote,
        user,
    }
}

fn usage(user: UserId, prompts: u32, millis: i64) -> AiUsage {
    let mut u = AiUsage::new(user, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
    u.prompt_count = prompts;
    u.updated_at = ts(millis);
    u
}

#[tokio::test]
async fn singleton_pulls_the_newer_remote_counter() {
    let f = single_fixture();
    f.local
        .add_or_update_item(usage(f.user.user_id, 3, 100))
        .await
        .unwrap();
    let remote_version = usage(f.user.user_id, 7, 200);
    f.remote.seed(remote_version.clone()).await.unwrap();

    assert!(f.manager.single_sync_round().await);
    assert_eq!(f.local.fetch_item().await.unwrap(), Some(remote_version));
}

#[tokio::test]
async fn singleton_pushes_a_local_only_counter() {
    let f = single_fixture();
    let local_version = usage(f.user.user_id, 5, 100);
    f.local.add_or_update_item(local_version.clone()).await.unwrap();

    assert!(f.manager.single_sync_round().await);
    assert_eq!(f.remote.get().await, Some(local_version));
}

#[tokio::test]
async fn singleton_round_with_nothing_on_either_side_succeeds() {
    let f = single_fixture();

    assert!(f.manager.single_sync_round().await);
    assert_eq!(f.remote.write_count(), 0);
}

#[tokio::test]
async fn singleton_clear_removes_only_the_local_copy() {
    let f = single_fixture();
    let doc = usage(f.user.user_id, 4, 100);
    f.local.add_or_update_item(doc.clone()).await.unwrap();
    assert!(f.manager.single_sync_round().await);

    f.manager.clear_source_data().await.unwrap();

    assert_eq!(f.local.fetch_item().await.unwrap(), None);
    assert_eq!(f.remote.get().await, Some(doc));
}

#[tokio::test]
async fn singleton_delete_document_removes_both_sides() {
    let f = single_fixture();
    let doc = usage(f.user.user_id, 4, 100);
    f.local.add_or_update_item(doc).await.unwrap();
    assert!(f.manager.single_sync_round().await);

    f.manager.delete_document().await.unwrap();

    assert_eq!(f.local.fetch_item().await.unwrap(), None);
    assert_eq!(f.remote.get().await, None);
}
