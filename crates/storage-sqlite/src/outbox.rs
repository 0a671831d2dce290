//! Durable mutation outbox: strictly enqueue-ordered pending writes.

use std::sync::Arc;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use herdbook_core::records::Collection;
use herdbook_core::sync::{now_millis, SyncOperation, SyncQueueEntry};
use herdbook_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_queue;

pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
struct SyncQueueEntryDB {
    id: i64,
    collection: String,
    op: String,
    record_id: String,
    payload: String,
    enqueued_at: i64,
    retries: i32,
}

#[derive(Insertable)]
#[diesel(table_name = crate::schema::sync_queue)]
struct NewSyncQueueEntryDB {
    collection: String,
    op: String,
    record_id: String,
    payload: String,
    enqueued_at: i64,
    retries: i32,
}

fn to_entry(row: SyncQueueEntryDB) -> Result<SyncQueueEntry> {
    Ok(SyncQueueEntry {
        id: row.id,
        collection: enum_from_db(&row.collection)?,
        op: enum_from_db(&row.op)?,
        record_id: row.record_id,
        payload: serde_json::from_str(&row.payload)?,
        enqueued_at: row.enqueued_at,
        retries: row.retries,
    })
}

/// Inside-transaction enqueue, used by the combined record-write paths.
pub(crate) fn enqueue_tx(
    conn: &mut SqliteConnection,
    collection: Collection,
    op: SyncOperation,
    record_id: &str,
    payload: &serde_json::Value,
) -> Result<i64> {
    let row = NewSyncQueueEntryDB {
        collection: enum_to_db(&collection)?,
        op: enum_to_db(&op)?,
        record_id: record_id.to_string(),
        payload: serde_json::to_string(payload)?,
        enqueued_at: now_millis(),
        retries: 0,
    };
    let id = diesel::insert_into(sync_queue::table)
        .values(&row)
        .returning(sync_queue::id)
        .get_result::<i64>(conn)
        .map_err(StorageError::from)?;
    Ok(id)
}

pub struct OutboxRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl OutboxRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    pub async fn enqueue(
        &self,
        collection: Collection,
        op: SyncOperation,
        record_id: &str,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let record_id = record_id.to_string();
        self.writer
            .exec(move |conn| enqueue_tx(conn, collection, op, &record_id, &payload))
            .await
    }

    /// All pending entries, oldest enqueue first. Replaying a stale update
    /// after a newer delete would resurrect a deleted record, so this
    /// ordering is load-bearing.
    pub fn list_pending(&self) -> Result<Vec<SyncQueueEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .order((sync_queue::enqueued_at.asc(), sync_queue::id.asc()))
            .load::<SyncQueueEntryDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(to_entry).collect()
    }

    /// Remove an entry once its remote call has been confirmed.
    pub async fn mark_done(&self, entry_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::delete(sync_queue::table.find(entry_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Bump the retry counter; the entry itself stays queued. No upper bound
    /// is enforced here.
    pub async fn increment_retry(&self, entry_id: i64) -> Result<()> {
        self.writer
            .exec(move |conn| {
                diesel::update(sync_queue::table.find(entry_id))
                    .set(sync_queue::retries.eq(sync_queue::retries + 1))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    pub fn pending_count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_queue::table
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }

    pub fn pending_count_for_collection(&self, collection: Collection) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_queue::table
            .filter(sync_queue::collection.eq(enum_to_db(&collection)?))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }

    pub fn pending_count_for(&self, record_id: &str) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_queue::table
            .filter(sync_queue::record_id.eq(record_id))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};
    use serde_json::json;

    fn test_outbox() -> OutboxRepository {
        let pool = create_pool(":memory:").expect("pool");
        run_migrations(&pool).expect("migrations");
        let writer = WriteHandle::new(Arc::clone(&pool));
        OutboxRepository::new(pool, writer)
    }

    #[tokio::test]
    async fn entries_come_back_in_enqueue_order() {
        let outbox = test_outbox();
        outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Create,
                "a-1",
                json!({"id": "a-1"}),
            )
            .await
            .expect("enqueue");
        outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Update,
                "a-1",
                json!({"status": "sold"}),
            )
            .await
            .expect("enqueue");
        outbox
            .enqueue(
                Collection::WeightRecord,
                SyncOperation::Delete,
                "w-1",
                json!({"id": "w-1"}),
            )
            .await
            .expect("enqueue");

        let pending = outbox.list_pending().expect("list");
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].op, SyncOperation::Create);
        assert_eq!(pending[1].op, SyncOperation::Update);
        assert_eq!(pending[2].collection, Collection::WeightRecord);
        assert!(pending.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn mark_done_removes_only_that_entry() {
        let outbox = test_outbox();
        let first = outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Create,
                "a-1",
                json!({}),
            )
            .await
            .expect("enqueue");
        outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Create,
                "a-2",
                json!({}),
            )
            .await
            .expect("enqueue");

        outbox.mark_done(first).await.expect("mark_done");
        let pending = outbox.list_pending().expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].record_id, "a-2");
    }

    #[tokio::test]
    async fn retry_increments_and_keeps_entry() {
        let outbox = test_outbox();
        let entry_id = outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Update,
                "a-1",
                json!({"category": "beef"}),
            )
            .await
            .expect("enqueue");

        outbox.increment_retry(entry_id).await.expect("retry");
        outbox.increment_retry(entry_id).await.expect("retry");

        let pending = outbox.list_pending().expect("list");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retries, 2);
        assert_eq!(pending[0].payload, json!({"category": "beef"}));
    }

    #[tokio::test]
    async fn pending_counts_by_record() {
        let outbox = test_outbox();
        outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Create,
                "a-1",
                json!({}),
            )
            .await
            .expect("enqueue");
        outbox
            .enqueue(
                Collection::Animal,
                SyncOperation::Update,
                "a-1",
                json!({}),
            )
            .await
            .expect("enqueue");

        assert_eq!(outbox.pending_count().expect("count"), 2);
        assert_eq!(outbox.pending_count_for("a-1").expect("count"), 2);
        assert_eq!(outbox.pending_count_for("a-2").expect("count"), 0);
    }
}
