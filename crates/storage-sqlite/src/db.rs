//! Connection pool, schema bootstrap, and the single-writer handle.

use std::sync::Arc;

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;

use herdbook_core::records::SYNC_COLLECTIONS;
use herdbook_core::{DatabaseError, Error, Result};

use crate::errors::StorageError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Build the shared connection pool.
pub fn create_pool(database_url: &str) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    // A private in-memory database exists on exactly one connection.
    let max_size = if database_url.contains(":memory:") { 1 } else { 8 };
    let pool = Pool::builder()
        .max_size(max_size)
        .build(manager)
        .map_err(|e| Error::Database(DatabaseError::Pool(e.to_string())))?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &Arc<DbPool>) -> Result<DbConnection> {
    pool.get()
        .map_err(|e| Error::Database(DatabaseError::Pool(e.to_string())))
}

/// Idempotent schema bootstrap: one record table per collection plus the
/// mutation outbox, with the secondary indexes the engine queries on.
pub fn run_migrations(pool: &Arc<DbPool>) -> Result<()> {
    let mut conn = get_connection(pool)?;

    diesel::sql_query("PRAGMA busy_timeout = 5000")
        .execute(&mut conn)
        .map_err(StorageError::from)?;

    for collection in SYNC_COLLECTIONS {
        let table = collection.table_name();
        diesel::sql_query(format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                synced INTEGER NOT NULL DEFAULT 0,
                last_modified BIGINT NOT NULL
            )"
        ))
        .execute(&mut conn)
        .map_err(StorageError::from)?;
        diesel::sql_query(format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_synced
                 ON {table} (synced, last_modified)"
        ))
        .execute(&mut conn)
        .map_err(StorageError::from)?;
    }

    diesel::sql_query(
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            op TEXT NOT NULL,
            record_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            enqueued_at BIGINT NOT NULL,
            retries INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(&mut conn)
    .map_err(StorageError::from)?;
    diesel::sql_query(
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_collection_op
             ON sync_queue (collection, op)",
    )
    .execute(&mut conn)
    .map_err(StorageError::from)?;
    diesel::sql_query(
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_enqueued_at
             ON sync_queue (enqueued_at)",
    )
    .execute(&mut conn)
    .map_err(StorageError::from)?;

    Ok(())
}

/// Serializes all writes through one gate and wraps each job in a single
/// transaction, so a record write and its outbox enqueue commit atomically.
#[derive(Clone)]
pub struct WriteHandle {
    pool: Arc<DbPool>,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl WriteHandle {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self {
            pool,
            gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub async fn exec<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _write_guard = self.gate.lock().await;
        let pool = Arc::clone(&self.pool);
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            // BEGIN IMMEDIATE takes the sqlite write lock up front; the whole
            // job commits or rolls back as one unit.
            diesel::sql_query("BEGIN IMMEDIATE")
                .execute(&mut conn)
                .map_err(StorageError::from)?;
            match job(&mut conn) {
                Ok(value) => {
                    diesel::sql_query("COMMIT")
                        .execute(&mut conn)
                        .map_err(StorageError::from)?;
                    Ok(value)
                }
                Err(err) => {
                    let _ = diesel::sql_query("ROLLBACK").execute(&mut conn);
                    Err(err)
                }
            }
        })
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::Internal(format!(
                "Write task failed to join: {e}"
            )))
        })?
    }
}
