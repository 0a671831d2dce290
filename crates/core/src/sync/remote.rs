//! Remote store collaborator contract.

use async_trait::async_trait;

use crate::errors::RemoteError;
use crate::records::SyncRecord;
use crate::sync::FilterSet;

/// Per-collection view of the authoritative remote store.
///
/// One implementation per entity collection keeps the boundary statically
/// checked; the engine never passes table names around at runtime. The
/// remote store enforces its own validation and authorization and is the
/// single source of truth whenever it is reachable.
#[async_trait]
pub trait RemoteCollection<T: SyncRecord>: Send + Sync {
    async fn insert(&self, payload: &T) -> Result<T, RemoteError>;

    async fn update(
        &self,
        record_id: &str,
        patch: &serde_json::Value,
    ) -> Result<T, RemoteError>;

    async fn delete(&self, record_id: &str) -> Result<(), RemoteError>;

    async fn select_all(&self) -> Result<Vec<T>, RemoteError>;

    async fn select_where(&self, filters: &FilterSet) -> Result<Vec<T>, RemoteError>;
}
