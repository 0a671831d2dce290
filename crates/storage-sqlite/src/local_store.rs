//! Per-collection durable record storage.
//!
//! All collection tables share one layout (id, json data, sync fields), so
//! the store issues raw SQL against the compile-time table name of each
//! collection instead of carrying a diesel DSL mapping per entity type.

use std::marker::PhantomData;
use std::sync::Arc;

use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;

use herdbook_core::records::SyncRecord;
use herdbook_core::sync::{FilterSet, LocalRecord, SyncOperation};
use herdbook_core::{DatabaseError, Error, Result};

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::outbox::enqueue_tx;

pub(crate) fn escape_sqlite_str(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn json_value_to_sql_literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(v) => {
            if *v {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        serde_json::Value::Number(v) => v.to_string(),
        serde_json::Value::String(v) => format!("'{}'", escape_sqlite_str(v)),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
            format!(
                "'{}'",
                escape_sqlite_str(&serde_json::to_string(value).unwrap_or_default())
            )
        }
    }
}

/// Filter fields address json keys directly, so only plain identifiers are
/// accepted.
fn validate_filter_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        return Ok(());
    }
    Err(Error::Database(DatabaseError::Internal(format!(
        "Invalid filter field '{}'",
        field
    ))))
}

fn filter_clause(filters: &FilterSet) -> Result<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut clauses = Vec::with_capacity(filters.len());
    for (field, value) in filters {
        validate_filter_field(field)?;
        clauses.push(format!(
            "json_extract(data, '$.{}') = {}",
            field,
            json_value_to_sql_literal(value)
        ));
    }
    Ok(format!(" WHERE {}", clauses.join(" AND ")))
}

#[derive(diesel::QueryableByName)]
struct RecordRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    data: String,
    #[diesel(sql_type = diesel::sql_types::Integer)]
    synced: i32,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    last_modified: i64,
}

fn row_to_record<T: SyncRecord>(row: RecordRow) -> Result<LocalRecord<T>> {
    let data = serde_json::from_str::<T>(&row.data)?;
    Ok(LocalRecord {
        data,
        synced: row.synced != 0,
        last_modified: row.last_modified,
    })
}

fn put_record_tx(
    conn: &mut SqliteConnection,
    table: &'static str,
    record_id: &str,
    data_json: &str,
    synced: bool,
    last_modified: i64,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {table} (id, data, synced, last_modified)
             VALUES ('{}', '{}', {}, {})
         ON CONFLICT(id) DO UPDATE SET
             data = excluded.data,
             synced = excluded.synced,
             last_modified = excluded.last_modified",
        escape_sqlite_str(record_id),
        escape_sqlite_str(data_json),
        synced as i32,
        last_modified,
    );
    diesel::sql_query(sql)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Shared handle over the physical store; one per process, many logical
/// collections.
#[derive(Clone)]
pub struct LocalStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LocalStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    /// Typed view over one collection's table.
    pub fn collection<T: SyncRecord>(&self) -> CollectionStore<T> {
        CollectionStore {
            pool: Arc::clone(&self.pool),
            writer: self.writer.clone(),
            _record: PhantomData,
        }
    }
}

/// Typed storage for one entity collection.
pub struct CollectionStore<T> {
    pool: Arc<DbPool>,
    writer: WriteHandle,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CollectionStore<T> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
            writer: self.writer.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: SyncRecord> CollectionStore<T> {
    fn table() -> &'static str {
        T::COLLECTION.table_name()
    }

    /// Insert-or-replace by id.
    pub async fn put(&self, record: &LocalRecord<T>) -> Result<()> {
        let record_id = record.data.record_id().to_string();
        let data_json = serde_json::to_string(&record.data)?;
        let synced = record.synced;
        let last_modified = record.last_modified;
        self.writer
            .exec(move |conn| {
                put_record_tx(
                    conn,
                    Self::table(),
                    &record_id,
                    &data_json,
                    synced,
                    last_modified,
                )
            })
            .await
    }

    pub fn get(&self, record_id: &str) -> Result<Option<LocalRecord<T>>> {
        let mut conn = get_connection(&self.pool)?;
        let sql = format!(
            "SELECT data, synced, last_modified FROM {} WHERE id = '{}'",
            Self::table(),
            escape_sqlite_str(record_id)
        );
        let rows = diesel::sql_query(sql)
            .load::<RecordRow>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().next().map(row_to_record).transpose()
    }

    pub async fn delete(&self, record_id: &str) -> Result<()> {
        let record_id = record_id.to_string();
        self.writer
            .exec(move |conn| {
                let sql = format!(
                    "DELETE FROM {} WHERE id = '{}'",
                    Self::table(),
                    escape_sqlite_str(&record_id)
                );
                diesel::sql_query(sql)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    /// Exact-match conjunction over the supplied fields; an empty filter set
    /// returns every record. Result ordering is unspecified.
    pub fn query(&self, filters: &FilterSet) -> Result<Vec<LocalRecord<T>>> {
        let mut conn = get_connection(&self.pool)?;
        let sql = format!(
            "SELECT data, synced, last_modified FROM {}{}",
            Self::table(),
            filter_clause(filters)?
        );
        let rows = diesel::sql_query(sql)
            .load::<RecordRow>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(row_to_record).collect()
    }

    pub fn all(&self) -> Result<Vec<LocalRecord<T>>> {
        self.query(&FilterSet::new())
    }

    /// Upsert many records in one transaction, so no reader observes a
    /// partial bulk write.
    pub async fn bulk_put(&self, records: Vec<LocalRecord<T>>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            rows.push((
                record.data.record_id().to_string(),
                serde_json::to_string(&record.data)?,
                record.synced,
                record.last_modified,
            ));
        }
        self.writer
            .exec(move |conn| {
                for (record_id, data_json, synced, last_modified) in rows {
                    put_record_tx(
                        conn,
                        Self::table(),
                        &record_id,
                        &data_json,
                        synced,
                        last_modified,
                    )?;
                }
                Ok(())
            })
            .await
    }

    /// Flip `synced` to true. Returns false when the record no longer exists
    /// locally (e.g. deleted while its create was still queued).
    pub async fn mark_synced(&self, record_id: &str) -> Result<bool> {
        let record_id = record_id.to_string();
        self.writer
            .exec(move |conn| {
                let sql = format!(
                    "UPDATE {} SET synced = 1 WHERE id = '{}'",
                    Self::table(),
                    escape_sqlite_str(&record_id)
                );
                let affected = diesel::sql_query(sql)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    /// Record write plus outbox enqueue in one transaction; there is no
    /// window in which the record is dirty without a queue entry.
    pub async fn put_queued(
        &self,
        record: &LocalRecord<T>,
        op: SyncOperation,
        payload: serde_json::Value,
    ) -> Result<i64> {
        let record_id = record.data.record_id().to_string();
        let data_json = serde_json::to_string(&record.data)?;
        let synced = record.synced;
        let last_modified = record.last_modified;
        self.writer
            .exec(move |conn| {
                put_record_tx(
                    conn,
                    Self::table(),
                    &record_id,
                    &data_json,
                    synced,
                    last_modified,
                )?;
                enqueue_tx(conn, T::COLLECTION, op, &record_id, &payload)
            })
            .await
    }

    /// Row removal plus Delete enqueue in one transaction.
    pub async fn delete_queued(&self, record_id: &str) -> Result<i64> {
        let record_id = record_id.to_string();
        self.writer
            .exec(move |conn| {
                let sql = format!(
                    "DELETE FROM {} WHERE id = '{}'",
                    Self::table(),
                    escape_sqlite_str(&record_id)
                );
                diesel::sql_query(sql)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                enqueue_tx(
                    conn,
                    T::COLLECTION,
                    SyncOperation::Delete,
                    &record_id,
                    &serde_json::json!({ "id": record_id }),
                )
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};
    use herdbook_core::records::Animal;
    use serde_json::json;

    fn test_store() -> LocalStore {
        let pool = create_pool(":memory:").expect("pool");
        run_migrations(&pool).expect("migrations");
        let writer = WriteHandle::new(Arc::clone(&pool));
        LocalStore::new(pool, writer)
    }

    fn animal(id: &str, tag: &str, category: &str) -> LocalRecord<Animal> {
        LocalRecord::dirty(Animal {
            id: id.to_string(),
            animal_id: tag.to_string(),
            category: category.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = test_store().collection::<Animal>();
        let record = animal("a-1", "A1", "beef");
        store.put(&record).await.expect("put");

        let loaded = store.get("a-1").expect("get").expect("present");
        assert_eq!(loaded.data, record.data);
        assert!(!loaded.synced);
        assert_eq!(loaded.last_modified, record.last_modified);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = test_store().collection::<Animal>();
        assert!(store.get("nope").expect("get").is_none());
    }

    #[tokio::test]
    async fn put_is_insert_or_replace() {
        let store = test_store().collection::<Animal>();
        store.put(&animal("a-1", "A1", "beef")).await.expect("put");
        store.put(&animal("a-1", "A1", "dairy")).await.expect("put");

        let all = store.all().expect("all");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data.category, "dairy");
    }

    #[tokio::test]
    async fn query_matches_exact_conjunction() {
        let store = test_store().collection::<Animal>();
        store.put(&animal("a-1", "A1", "beef")).await.expect("put");
        store.put(&animal("a-2", "A2", "beef")).await.expect("put");
        store.put(&animal("a-3", "A3", "dairy")).await.expect("put");

        let beef = store
            .query(&vec![("category".to_string(), json!("beef"))])
            .expect("query");
        assert_eq!(beef.len(), 2);

        let one = store
            .query(&vec![
                ("category".to_string(), json!("beef")),
                ("animal_id".to_string(), json!("A2")),
            ])
            .expect("query");
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].data.id, "a-2");
    }

    #[tokio::test]
    async fn query_rejects_hostile_filter_field() {
        let store = test_store().collection::<Animal>();
        let err = store
            .query(&vec![("x') OR ('1'='1".to_string(), json!("x"))])
            .expect_err("must reject");
        assert!(matches!(
            err,
            Error::Database(DatabaseError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn quotes_in_values_are_escaped() {
        let store = test_store().collection::<Animal>();
        let mut record = animal("a-1", "A'1", "beef");
        record.data.notes = Some("it's fine".to_string());
        store.put(&record).await.expect("put");

        let found = store
            .query(&vec![("animal_id".to_string(), json!("A'1"))])
            .expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].data.notes.as_deref(), Some("it's fine"));
    }

    #[tokio::test]
    async fn bulk_put_upserts_many() {
        let store = test_store().collection::<Animal>();
        store.put(&animal("a-1", "A1", "beef")).await.expect("put");

        let incoming = vec![
            LocalRecord::pulled(Animal {
                id: "a-1".to_string(),
                animal_id: "A1".to_string(),
                category: "beef".to_string(),
                status: Some("sold".to_string()),
                ..Default::default()
            }),
            LocalRecord::pulled(Animal {
                id: "a-9".to_string(),
                animal_id: "A9".to_string(),
                category: "dairy".to_string(),
                ..Default::default()
            }),
        ];
        store.bulk_put(incoming).await.expect("bulk_put");

        let all = store.all().expect("all");
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.synced));
    }

    #[tokio::test]
    async fn mark_synced_is_noop_for_missing_record() {
        let store = test_store().collection::<Animal>();
        assert!(!store.mark_synced("gone").await.expect("mark"));

        store.put(&animal("a-1", "A1", "beef")).await.expect("put");
        assert!(store.mark_synced("a-1").await.expect("mark"));
        assert!(store.get("a-1").expect("get").expect("present").synced);
    }
}
