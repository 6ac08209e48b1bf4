//! Background sync service.
//!
//! Event loop driving the facade: a periodic tick runs one round across all
//! sources, a command channel serves "sync now" and shutdown. The periodic
//! scheduling primitive itself is platform-owned and reaches this core only
//! through the [`SyncWorkManager`] contract.

use crate::error::{SyncError, SyncResult};
use crate::facade::SyncFacade;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// State of the platform's periodic background job, as reported by the
/// scheduler. Consumed here, never produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatWorkStatus {
    /// Scheduled and waiting for its next slot.
    Enqueued,
    /// Currently executing.
    Running,
    /// Cancelled by the application or the platform.
    Cancelled,
    /// Last execution failed; the scheduler decides on retry/backoff.
    Failed,
}

/// Contract of the platform-owned periodic scheduler.
#[async_trait]
pub trait SyncWorkManager: Send + Sync {
    /// Reports the current state of the periodic sync job.
    async fn fetch_work_status(&self) -> RepeatWorkStatus;

    /// Schedules the periodic job, or retries it if the last run failed.
    async fn start_or_retry_sync_service(&self) -> SyncResult<()>;

    /// Cancels the periodic job.
    async fn stop_sync_service(&self) -> SyncResult<()>;
}

/// Commands accepted by the running service.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run one round across all sources now and report the aggregate result.
    SyncNow { reply: oneshot::Sender<bool> },
    /// Stop the service, stopping every manager on the way out.
    Stop,
}

/// Clone-able handle for sending commands to a running [`SyncService`].
#[derive(Clone)]
pub struct SyncServiceHandle {
    command_tx: mpsc::Sender<SyncCommand>,
}

impl SyncServiceHandle {
    /// Requests one immediate round and awaits its aggregate result.
    pub async fn sync_now(&self) -> SyncResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SyncCommand::SyncNow { reply })
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }

    /// Stops the service.
    pub async fn stop(&self) -> SyncResult<()> {
        self.command_tx
            .send(SyncCommand::Stop)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// The background sync event loop.
pub struct SyncService {
    facade: Arc<SyncFacade>,
    command_rx: mpsc::Receiver<SyncCommand>,
    round_interval: Duration,
}

/// Creates a sync service and its command handle. The service does nothing
/// until [`SyncService::run`] is awaited (typically inside `tokio::spawn`).
pub fn create_sync_service(
    facade: Arc<SyncFacade>,
    round_interval: Duration,
) -> (SyncServiceHandle, SyncService) {
    let (command_tx, command_rx) = mpsc::channel(16);
    (
        SyncServiceHandle { command_tx },
        SyncService {
            facade,
            command_rx,
            round_interval,
        },
    )
}

impl SyncService {
    /// Runs the service until stopped: starts every source, then serves
    /// periodic rounds and commands.
    pub async fn run(mut self) {
        info!(
            "sync service started for {} sources, round interval {:?}",
            self.facade.len(),
            self.round_interval
        );
        self.facade.start_all_sources().await;

        let mut tick = tokio::time::interval(self.round_interval);
        // Skip the immediate first tick; the managers just ran their
        // initial passes.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if !self.facade.single_sync_all_sources().await {
                        warn!("periodic sync round reported failures");
                    }
                }
                cmd = self.command_rx.recv() => match cmd {
                    Some(SyncCommand::SyncNow { reply }) => {
                        let ok = self.facade.single_sync_all_sources().await;
                        let _ = reply.send(ok);
                    }
                    Some(SyncCommand::Stop) => {
                        info!("sync service stopping");
                        break;
                    }
                    None => {
                        info!("command channel closed, stopping sync service");
                        break;
                    }
                }
            }
        }

        self.facade.stop_all_sources().await;
        info!("sync service stopped");
    }
}
