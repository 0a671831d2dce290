//! Offline-first sync engine: connectivity monitoring, the sync
//! orchestrator, and the per-collection entity services the application
//! talks to instead of the stores directly.

pub mod adapter;
pub mod connectivity;
pub mod context;
pub mod orchestrator;
pub mod service;

pub use adapter::{CollectionSyncHandle, EntitySyncAdapter};
pub use connectivity::ConnectivityMonitor;
pub use context::{RemoteStores, ServiceContext};
pub use orchestrator::{CycleOutcome, SyncOrchestrator};
pub use service::EntityService;
