//! Offline-first entity services, one per collection.
//!
//! Every mutation lands in the local store and the outbox first and succeeds
//! regardless of connectivity; when the device is online the service
//! additionally attempts the remote call right away so a healthy connection
//! never waits for the next background cycle. Reads prefer live remote data
//! and fall back to the local cache silently.

use std::sync::Arc;

use log::{debug, warn};
use uuid::Uuid;

use herdbook_core::records::SyncRecord;
use herdbook_core::sync::{
    merge_patch, FilterSet, LocalRecord, RemoteCollection, SyncOperation,
};
use herdbook_core::{DatabaseError, Error, Result};
use herdbook_storage_sqlite::{CollectionStore, OutboxRepository};

use crate::connectivity::ConnectivityMonitor;

pub struct EntityService<T: SyncRecord> {
    store: CollectionStore<T>,
    remote: Arc<dyn RemoteCollection<T>>,
    outbox: Arc<OutboxRepository>,
    connectivity: Arc<ConnectivityMonitor>,
}

impl<T: SyncRecord> Clone for EntityService<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            remote: Arc::clone(&self.remote),
            outbox: Arc::clone(&self.outbox),
            connectivity: Arc::clone(&self.connectivity),
        }
    }
}

impl<T: SyncRecord> EntityService<T> {
    pub fn new(
        store: CollectionStore<T>,
        remote: Arc<dyn RemoteCollection<T>>,
        outbox: Arc<OutboxRepository>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            remote,
            outbox,
            connectivity,
        }
    }

    /// Create a record. The id is assigned client-side when absent, so
    /// offline creates still get a stable identity.
    pub async fn create(&self, mut data: T) -> Result<T> {
        if data.record_id().is_empty() {
            data.set_record_id(Uuid::new_v4().to_string());
        }
        let payload = serde_json::to_value(&data)?;
        let record = LocalRecord::dirty(data);
        let entry_id = self
            .store
            .put_queued(&record, SyncOperation::Create, payload)
            .await?;

        if self.connectivity.is_online() {
            match self.remote.insert(&record.data).await {
                Ok(_) => {
                    self.store.mark_synced(record.data.record_id()).await?;
                    self.outbox.mark_done(entry_id).await?;
                }
                Err(e) => {
                    warn!(
                        "immediate push of create {} failed, left queued: {}",
                        record.data.record_id(),
                        e
                    );
                }
            }
        }
        Ok(record.data)
    }

    /// Apply a merge patch (RFC 7396) to an existing record.
    pub async fn update(&self, record_id: &str, patch: serde_json::Value) -> Result<T> {
        let existing = self.store.get(record_id)?.ok_or_else(|| {
            Error::Database(DatabaseError::NotFound(format!(
                "No record '{}' in {}",
                record_id,
                T::COLLECTION.table_name()
            )))
        })?;

        let mut merged = serde_json::to_value(&existing.data)?;
        merge_patch(&mut merged, &patch);
        let mut data = serde_json::from_value::<T>(merged)?;
        // A patch cannot reassign a record's identity.
        data.set_record_id(record_id.to_string());

        let record = LocalRecord::dirty(data);
        let entry_id = self
            .store
            .put_queued(&record, SyncOperation::Update, patch.clone())
            .await?;

        if self.connectivity.is_online() {
            match self.remote.update(record_id, &patch).await {
                Ok(_) => {
                    self.store.mark_synced(record_id).await?;
                    self.outbox.mark_done(entry_id).await?;
                }
                Err(e) => {
                    warn!(
                        "immediate push of update {} failed, left queued: {}",
                        record_id, e
                    );
                }
            }
        }
        Ok(record.data)
    }

    /// Delete a record locally and queue the remote delete. Deleting an
    /// unknown id is a no-op apart from the queued delete, which the remote
    /// store treats as idempotent.
    pub async fn delete(&self, record_id: &str) -> Result<()> {
        let entry_id = self.store.delete_queued(record_id).await?;

        if self.connectivity.is_online() {
            match self.remote.delete(record_id).await {
                Ok(()) => self.outbox.mark_done(entry_id).await?,
                Err(e) => {
                    warn!(
                        "immediate push of delete {} failed, left queued: {}",
                        record_id, e
                    );
                }
            }
        }
        Ok(())
    }

    /// All records: live from the remote store when online (refreshing the
    /// cache on the way through), otherwise from the local cache.
    pub async fn get_all(&self) -> Result<Vec<T>> {
        if self.connectivity.is_online() {
            match self.remote.select_all().await {
                Ok(records) => {
                    let incoming = records
                        .iter()
                        .cloned()
                        .map(LocalRecord::pulled)
                        .collect::<Vec<_>>();
                    self.store.bulk_put(incoming).await?;
                    return Ok(records);
                }
                Err(e) => {
                    debug!(
                        "live read of {} failed, serving cache: {}",
                        T::COLLECTION.table_name(),
                        e
                    );
                }
            }
        }
        Ok(self.store.all()?.into_iter().map(|r| r.data).collect())
    }

    /// Single record by id, live-first with silent cache fallback.
    pub async fn get_by_id(&self, record_id: &str) -> Result<Option<T>> {
        if self.connectivity.is_online() {
            let filters: FilterSet = vec![("id".to_string(), serde_json::json!(record_id))];
            match self.remote.select_where(&filters).await {
                Ok(records) => {
                    if let Some(data) = records.into_iter().next() {
                        self.store.put(&LocalRecord::pulled(data.clone())).await?;
                        return Ok(Some(data));
                    }
                    // Live miss: the record may exist only locally (created
                    // offline and not yet pushed).
                }
                Err(e) => {
                    debug!(
                        "live read of {}/{} failed, serving cache: {}",
                        T::COLLECTION.table_name(),
                        record_id,
                        e
                    );
                }
            }
        }
        Ok(self.store.get(record_id)?.map(|r| r.data))
    }

    /// Exact-match query, live-first with silent cache fallback.
    pub async fn query(&self, filters: &FilterSet) -> Result<Vec<T>> {
        if self.connectivity.is_online() {
            match self.remote.select_where(filters).await {
                Ok(records) => {
                    let incoming = records
                        .iter()
                        .cloned()
                        .map(LocalRecord::pulled)
                        .collect::<Vec<_>>();
                    self.store.bulk_put(incoming).await?;
                    return Ok(records);
                }
                Err(e) => {
                    debug!(
                        "live query of {} failed, serving cache: {}",
                        T::COLLECTION.table_name(),
                        e
                    );
                }
            }
        }
        Ok(self
            .store
            .query(filters)?
            .into_iter()
            .map(|r| r.data)
            .collect())
    }

    /// Number of queued mutations for this collection, for "N unsynced"
    /// badges.
    pub fn pending_mutations(&self) -> Result<i64> {
        self.outbox.pending_count_for_collection(T::COLLECTION)
    }
}
