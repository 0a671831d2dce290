//! Per-collection glue between the outbox, the local store and the typed
//! remote collection.
//!
//! The orchestrator drives every collection through the object-safe
//! [`CollectionSyncHandle`]; [`EntitySyncAdapter`] is the one generic
//! implementation, instantiated once per entity type.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use herdbook_core::records::{Collection, SyncRecord};
use herdbook_core::sync::{LocalRecord, RemoteCollection, SyncOperation, SyncQueueEntry};
use herdbook_core::Result;
use herdbook_storage_sqlite::CollectionStore;

/// Collection-erased sync operations the orchestrator needs.
#[async_trait]
pub trait CollectionSyncHandle: Send + Sync {
    fn collection(&self) -> Collection;

    /// Replay one queued mutation against the remote store.
    async fn push_entry(&self, entry: &SyncQueueEntry) -> Result<()>;

    /// Flip the local record's synced flag after a confirmed push. Returns
    /// false when the record no longer exists locally.
    async fn mark_synced(&self, record_id: &str) -> Result<bool>;

    /// Replace the local cache with the remote collection contents.
    /// Returns the number of records pulled.
    async fn pull(&self) -> Result<usize>;
}

/// Typed sync adapter for one entity collection.
pub struct EntitySyncAdapter<T: SyncRecord> {
    store: CollectionStore<T>,
    remote: Arc<dyn RemoteCollection<T>>,
}

impl<T: SyncRecord> EntitySyncAdapter<T> {
    pub fn new(store: CollectionStore<T>, remote: Arc<dyn RemoteCollection<T>>) -> Self {
        Self { store, remote }
    }
}

#[async_trait]
impl<T: SyncRecord> CollectionSyncHandle for EntitySyncAdapter<T> {
    fn collection(&self) -> Collection {
        T::COLLECTION
    }

    async fn push_entry(&self, entry: &SyncQueueEntry) -> Result<()> {
        match entry.op {
            SyncOperation::Create => {
                let record = serde_json::from_value::<T>(entry.payload.clone())?;
                self.remote.insert(&record).await?;
            }
            SyncOperation::Update => {
                self.remote.update(&entry.record_id, &entry.payload).await?;
            }
            SyncOperation::Delete => {
                self.remote.delete(&entry.record_id).await?;
            }
        }
        Ok(())
    }

    async fn mark_synced(&self, record_id: &str) -> Result<bool> {
        self.store.mark_synced(record_id).await
    }

    async fn pull(&self) -> Result<usize> {
        let records = self.remote.select_all().await?;
        let count = records.len();
        let incoming = records
            .into_iter()
            .map(LocalRecord::pulled)
            .collect::<Vec<_>>();
        self.store.bulk_put(incoming).await?;
        debug!(
            "pulled {} records into {}",
            count,
            T::COLLECTION.table_name()
        );
        Ok(count)
    }
}
