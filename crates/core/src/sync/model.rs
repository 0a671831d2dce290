//! Core sync domain model shared by the storage layer and the engine.

use serde::{Deserialize, Serialize};

use crate::records::Collection;

/// Supported mutation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

/// Process-wide sync engine status, owned exclusively by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
}

/// Current connectivity snapshot, derived from the host signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

/// Emitted exactly once per connectivity transition, never for repeated
/// signals of the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityEvent {
    BecameOnline,
    BecameOffline,
}

/// A pending mutation awaiting transmission to the remote store.
///
/// Created at the moment of a local write, deleted only after the remote
/// call is confirmed, retried (same entry) on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueEntry {
    pub id: i64,
    pub collection: Collection,
    pub op: SyncOperation,
    pub record_id: String,
    pub payload: serde_json::Value,
    pub enqueued_at: i64,
    pub retries: i32,
}

/// A locally stored record plus its engine-owned sync fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalRecord<T> {
    pub data: T,
    /// True iff the remote store is known to hold an identical or newer copy.
    pub synced: bool,
    /// Epoch milliseconds of the latest local mutation.
    pub last_modified: i64,
}

impl<T> LocalRecord<T> {
    /// A fresh, not-yet-pushed local record stamped now.
    pub fn dirty(data: T) -> Self {
        Self {
            data,
            synced: false,
            last_modified: super::now_millis(),
        }
    }

    /// A record mirrored from the remote store, stamped now.
    pub fn pulled(data: T) -> Self {
        Self {
            data,
            synced: true,
            last_modified: super::now_millis(),
        }
    }
}

/// Exact-match conjunction over record fields; empty set matches everything.
pub type FilterSet = Vec<(String, serde_json::Value)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_serialization_matches_storage_contract() {
        let ops = [
            SyncOperation::Create,
            SyncOperation::Update,
            SyncOperation::Delete,
        ]
        .iter()
        .map(|op| serde_json::to_string(op).expect("serialize op"))
        .collect::<Vec<_>>();
        assert_eq!(ops, vec!["\"create\"", "\"update\"", "\"delete\""]);
    }

    #[test]
    fn dirty_records_start_unsynced() {
        let record = LocalRecord::dirty(42u32);
        assert!(!record.synced);
        assert!(record.last_modified > 0);
    }
}
