//! Facade over the full set of registered sync managers.
//!
//! Fan-out operations launch one task per manager in a [`JoinSet`] and join
//! them all, so one entity type's failure never cancels the others' work;
//! only the aggregate verdict reflects it. Dropping a fan-out future aborts
//! the whole set, so cancelling the caller cancels the children too.

use crate::error::{SyncError, SyncResult};
use crate::manager::SourceSyncManager;
use std::sync::Arc;
use studyplan_types::SourceSyncKey;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Holds the fixed list of managers, one per entity type, built once at
/// process start.
pub struct SyncFacade {
    managers: Vec<Arc<dyn SourceSyncManager>>,
}

impl SyncFacade {
    #[must_use]
    pub fn new(managers: Vec<Arc<dyn SourceSyncManager>>) -> Self {
        Self { managers }
    }

    /// Source keys of every registered manager.
    #[must_use]
    pub fn keys(&self) -> Vec<SourceSyncKey> {
        self.managers.iter().map(|m| m.key()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Starts continuous sync on every manager. Returns once every start has
    /// been issued; the initial passes run in the managers' own tasks.
    pub async fn start_all_sources(&self) {
        info!("starting sync for {} sources", self.managers.len());
        for manager in &self.managers {
            manager.start_source_sync().await;
        }
    }

    /// Runs one reconciliation round on every manager concurrently and
    /// returns the logical AND of the results. Every manager completes its
    /// own attempt regardless of the others' outcomes.
    pub async fn single_sync_all_sources(&self) -> bool {
        let mut rounds = JoinSet::new();
        for manager in &self.managers {
            let manager = manager.clone();
            rounds.spawn(async move { (manager.key(), manager.single_sync_round().await) });
        }

        let mut all_ok = true;
        while let Some(round) = rounds.join_next().await {
            match round {
                Ok((key, ok)) => {
                    if !ok {
                        warn!("sync round for {key} reported failure");
                        all_ok = false;
                    }
                }
                Err(e) => {
                    error!("sync round task failed: {e}");
                    all_ok = false;
                }
            }
        }
        all_ok
    }

    /// Stops every manager, awaiting cancellation of all subscription tasks
    /// so a subsequent [`SyncFacade::clear_all_synced_data`] cannot race an
    /// in-flight write. Best-effort: continues past individual failures.
    pub async fn stop_all_sources(&self) {
        let mut stops = JoinSet::new();
        for manager in &self.managers {
            let manager = manager.clone();
            stops.spawn(async move {
                manager.stop_source_sync().await;
            });
        }
        while let Some(stop) = stops.join_next().await {
            if let Err(e) = stop {
                error!("stop task failed: {e}");
            }
        }
        info!("all sync sources stopped");
    }

    /// Clears every manager's local data (sign-out / account switch). Remote
    /// data is untouched. Continues past individual failures and reports the
    /// first one.
    pub async fn clear_all_synced_data(&self) -> SyncResult<()> {
        let mut first_err: Option<SyncError> = None;
        for manager in &self.managers {
            if let Err(e) = manager.clear_source_data().await {
                warn!("failed to clear local data for {}: {e}", manager.key());
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
