//! Sync orchestrator: drains the outbox to the remote store, refreshes the
//! local cache from it, and owns the process-wide sync status.
//!
//! At most one sync cycle runs at a time; overlapping triggers (timer,
//! reconnect, manual) collapse into [`CycleOutcome::Busy`] instead of piling
//! up. Offline, every trigger is a no-op.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use herdbook_core::sync::{
    ConnectivityEvent, SyncOperation, SyncQueueEntry, SyncStatus, SYNC_INTERVAL_JITTER_SECS,
    SYNC_INTERVAL_SECS, SYNC_PENDING_INTERVAL_SECS,
};
use herdbook_core::{Error, Result};
use herdbook_storage_sqlite::OutboxRepository;

use crate::adapter::CollectionSyncHandle;
use crate::connectivity::ConnectivityMonitor;

/// How a sync trigger resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A full push + pull cycle ran. `clean` is false when any mutation or
    /// collection refresh failed, even per-entry failures that leave the
    /// status at `Idle`.
    Completed { clean: bool },
    /// Skipped: the device is offline.
    Offline,
    /// Skipped: another cycle is already in flight.
    Busy,
}

pub struct SyncOrchestrator {
    handles: Vec<Arc<dyn CollectionSyncHandle>>,
    outbox: Arc<OutboxRepository>,
    connectivity: Arc<ConnectivityMonitor>,
    /// Held for the duration of a cycle; `try_lock` doubles as the
    /// check-and-set that keeps cycles from overlapping.
    cycle_gate: Mutex<()>,
    status: watch::Sender<SyncStatus>,
    runner: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl SyncOrchestrator {
    pub fn new(
        handles: Vec<Arc<dyn CollectionSyncHandle>>,
        outbox: Arc<OutboxRepository>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        let (shutdown, _) = watch::channel(false);
        Self {
            handles,
            outbox,
            connectivity,
            cycle_gate: Mutex::new(()),
            status,
            runner: Mutex::new(None),
            shutdown,
        }
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Run one push + pull cycle now, unless offline or already syncing.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if !self.connectivity.is_online() {
            debug!("sync cycle skipped: offline");
            return CycleOutcome::Offline;
        }
        let Ok(_guard) = self.cycle_gate.try_lock() else {
            debug!("sync cycle skipped: already in flight");
            return CycleOutcome::Busy;
        };

        self.status.send_replace(SyncStatus::Syncing);
        let started = std::time::Instant::now();
        // Per-entry push failures taint `clean` but are not orchestrator
        // failures: the entries stay queued and the terminal status is still
        // Idle. Only an aborted push or a failed collection refresh is
        // `fatal` and surfaces as Error.
        let mut clean = true;
        let mut fatal = false;

        match self.sync_to_server().await {
            Ok(push_clean) => clean &= push_clean,
            Err(e) => {
                error!("outbox push aborted: {}", e);
                clean = false;
                fatal = true;
            }
        }
        match self.sync_from_server().await {
            Ok(pull_clean) => {
                clean &= pull_clean;
                fatal |= !pull_clean;
            }
            Err(e) => {
                error!("cache pull aborted: {}", e);
                clean = false;
                fatal = true;
            }
        }

        let final_status = if fatal {
            SyncStatus::Error
        } else {
            SyncStatus::Idle
        };
        self.status.send_replace(final_status);
        info!(
            "sync cycle finished in {:?} (status: {:?}, clean: {})",
            started.elapsed(),
            final_status,
            clean
        );
        CycleOutcome::Completed { clean }
    }

    /// Manual trigger. Returns true only when a cycle ran to completion with
    /// no failures of any kind.
    pub async fn force_sync_now(&self) -> bool {
        match self.run_cycle().await {
            CycleOutcome::Completed { clean } => clean,
            CycleOutcome::Offline | CycleOutcome::Busy => false,
        }
    }

    /// Drain the outbox in enqueue order. Remote and payload failures are
    /// per-entry: the entry's retry counter is bumped and the drain moves
    /// on. Storage failures abort the drain.
    async fn sync_to_server(&self) -> Result<bool> {
        let pending = self.outbox.list_pending()?;
        if pending.is_empty() {
            return Ok(true);
        }
        debug!("pushing {} pending mutations", pending.len());

        let mut clean = true;
        for entry in pending {
            match self.push_one(&entry).await {
                Ok(()) => {
                    if entry.op != SyncOperation::Delete {
                        self.handle_for(&entry)?.mark_synced(&entry.record_id).await?;
                    }
                    self.outbox.mark_done(entry.id).await?;
                }
                Err(Error::Database(e)) => return Err(Error::Database(e)),
                Err(e) => {
                    warn!(
                        "push failed for {} {:?} {} (retry {}): {}",
                        entry.collection.table_name(),
                        entry.op,
                        entry.record_id,
                        entry.retries + 1,
                        e
                    );
                    self.outbox.increment_retry(entry.id).await?;
                    clean = false;
                }
            }
        }
        Ok(clean)
    }

    async fn push_one(&self, entry: &SyncQueueEntry) -> Result<()> {
        self.handle_for(entry)?.push_entry(entry).await
    }

    fn handle_for(&self, entry: &SyncQueueEntry) -> Result<&Arc<dyn CollectionSyncHandle>> {
        self.handles
            .iter()
            .find(|h| h.collection() == entry.collection)
            .ok_or_else(|| {
                Error::Database(herdbook_core::DatabaseError::Internal(format!(
                    "no sync handle registered for collection {:?}",
                    entry.collection
                )))
            })
    }

    /// Refresh every collection cache from the remote store. A failing
    /// collection is skipped so the others still refresh; storage failures
    /// abort the pull.
    async fn sync_from_server(&self) -> Result<bool> {
        let mut clean = true;
        for handle in &self.handles {
            match handle.pull().await {
                Ok(count) => {
                    debug!(
                        "refreshed {} ({} records)",
                        handle.collection().table_name(),
                        count
                    );
                }
                Err(Error::Database(e)) => return Err(Error::Database(e)),
                Err(e) => {
                    warn!(
                        "pull failed for {}: {}",
                        handle.collection().table_name(),
                        e
                    );
                    clean = false;
                }
            }
        }
        Ok(clean)
    }

    /// Start the background loop: periodic cycles with a short interval while
    /// mutations are pending, plus an immediate cycle on reconnect.
    pub async fn start(self: &Arc<Self>) {
        let mut runner = self.runner.lock().await;
        if runner.is_some() {
            warn!("sync loop already running");
            return;
        }
        let orchestrator = Arc::clone(self);
        let mut events = self.connectivity.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            info!("background sync loop started");
            loop {
                let interval = if orchestrator.has_pending() {
                    SYNC_PENDING_INTERVAL_SECS
                } else {
                    SYNC_INTERVAL_SECS
                };
                // Spread cycles out so many devices sharing a backend do not
                // fire in lockstep.
                let jitter_ms = Utc::now().timestamp_millis().unsigned_abs()
                    % (SYNC_INTERVAL_JITTER_SECS * 1000);
                let delay = Duration::from_secs(interval) + Duration::from_millis(jitter_ms);

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        orchestrator.run_cycle().await;
                    }
                    event = events.recv() => match event {
                        Ok(ConnectivityEvent::BecameOnline) => {
                            info!("connectivity restored, syncing now");
                            orchestrator.run_cycle().await;
                        }
                        Ok(ConnectivityEvent::BecameOffline) => {
                            debug!("connectivity lost, sync loop idling");
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("connectivity events lagged, skipped {}", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
            info!("background sync loop stopped");
        });
        *runner = Some(handle);
    }

    pub async fn stop(&self) {
        let mut runner = self.runner.lock().await;
        if let Some(handle) = runner.take() {
            let _ = self.shutdown.send(true);
            let _ = handle.await;
        }
    }

    fn has_pending(&self) -> bool {
        match self.outbox.pending_count() {
            Ok(count) => count > 0,
            Err(e) => {
                warn!("failed to read pending count: {}", e);
                false
            }
        }
    }
}
