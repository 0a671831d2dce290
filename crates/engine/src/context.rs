//! Composition root: wires the pool, stores, outbox, orchestrator and the
//! per-collection services into one explicitly constructed context that the
//! host application owns and passes around.

use std::sync::Arc;

use log::info;

use herdbook_core::records::{
    Animal, FeedingLog, InventoryItem, MedicineLog, VaccineLog, WeightRecord,
};
use herdbook_core::sync::{ConnectivityState, RemoteCollection};
use herdbook_core::Result;
use herdbook_remote_http::RemoteStoreClient;
use herdbook_storage_sqlite::{
    create_pool, run_migrations, LocalStore, OutboxRepository, WriteHandle,
};

use crate::adapter::{CollectionSyncHandle, EntitySyncAdapter};
use crate::connectivity::ConnectivityMonitor;
use crate::orchestrator::SyncOrchestrator;
use crate::service::EntityService;

/// One typed remote endpoint per collection. Abstract so tests can inject
/// in-memory doubles where production injects HTTP clients.
pub struct RemoteStores {
    pub animals: Arc<dyn RemoteCollection<Animal>>,
    pub weight_records: Arc<dyn RemoteCollection<WeightRecord>>,
    pub feeding_logs: Arc<dyn RemoteCollection<FeedingLog>>,
    pub medicine_logs: Arc<dyn RemoteCollection<MedicineLog>>,
    pub vaccine_logs: Arc<dyn RemoteCollection<VaccineLog>>,
    pub inventory_items: Arc<dyn RemoteCollection<InventoryItem>>,
}

impl RemoteStores {
    /// All collections backed by the HTTP remote store.
    pub fn http(client: &RemoteStoreClient) -> Self {
        Self {
            animals: Arc::new(client.collection::<Animal>()),
            weight_records: Arc::new(client.collection::<WeightRecord>()),
            feeding_logs: Arc::new(client.collection::<FeedingLog>()),
            medicine_logs: Arc::new(client.collection::<MedicineLog>()),
            vaccine_logs: Arc::new(client.collection::<VaccineLog>()),
            inventory_items: Arc::new(client.collection::<InventoryItem>()),
        }
    }
}

/// Owns every long-lived engine component. Constructed once at startup and
/// handed to the host; nothing in the engine reaches for globals.
pub struct ServiceContext {
    connectivity: Arc<ConnectivityMonitor>,
    outbox: Arc<OutboxRepository>,
    orchestrator: Arc<SyncOrchestrator>,
    animals: EntityService<Animal>,
    weight_records: EntityService<WeightRecord>,
    feeding_logs: EntityService<FeedingLog>,
    medicine_logs: EntityService<MedicineLog>,
    vaccine_logs: EntityService<VaccineLog>,
    inventory_items: EntityService<InventoryItem>,
}

impl ServiceContext {
    /// Open (or create) the local database at `db_path`, run migrations and
    /// wire the full engine against the given remote stores.
    pub fn new(
        db_path: &str,
        initial_connectivity: ConnectivityState,
        remotes: RemoteStores,
    ) -> Result<Arc<Self>> {
        let pool = create_pool(db_path)?;
        run_migrations(&pool)?;
        info!("local store ready at {}", db_path);

        let writer = WriteHandle::new(Arc::clone(&pool));
        let local = LocalStore::new(Arc::clone(&pool), writer.clone());
        let outbox = Arc::new(OutboxRepository::new(Arc::clone(&pool), writer));
        let connectivity = Arc::new(ConnectivityMonitor::new(initial_connectivity));

        let handles: Vec<Arc<dyn CollectionSyncHandle>> = vec![
            Arc::new(EntitySyncAdapter::new(
                local.collection::<Animal>(),
                Arc::clone(&remotes.animals),
            )),
            Arc::new(EntitySyncAdapter::new(
                local.collection::<WeightRecord>(),
                Arc::clone(&remotes.weight_records),
            )),
            Arc::new(EntitySyncAdapter::new(
                local.collection::<FeedingLog>(),
                Arc::clone(&remotes.feeding_logs),
            )),
            Arc::new(EntitySyncAdapter::new(
                local.collection::<MedicineLog>(),
                Arc::clone(&remotes.medicine_logs),
            )),
            Arc::new(EntitySyncAdapter::new(
                local.collection::<VaccineLog>(),
                Arc::clone(&remotes.vaccine_logs),
            )),
            Arc::new(EntitySyncAdapter::new(
                local.collection::<InventoryItem>(),
                Arc::clone(&remotes.inventory_items),
            )),
        ];
        let orchestrator = Arc::new(SyncOrchestrator::new(
            handles,
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        ));

        let animals = EntityService::new(
            local.collection(),
            Arc::clone(&remotes.animals),
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        );
        let weight_records = EntityService::new(
            local.collection(),
            Arc::clone(&remotes.weight_records),
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        );
        let feeding_logs = EntityService::new(
            local.collection(),
            Arc::clone(&remotes.feeding_logs),
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        );
        let medicine_logs = EntityService::new(
            local.collection(),
            Arc::clone(&remotes.medicine_logs),
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        );
        let vaccine_logs = EntityService::new(
            local.collection(),
            Arc::clone(&remotes.vaccine_logs),
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        );
        let inventory_items = EntityService::new(
            local.collection(),
            Arc::clone(&remotes.inventory_items),
            Arc::clone(&outbox),
            Arc::clone(&connectivity),
        );

        Ok(Arc::new(Self {
            connectivity,
            outbox,
            orchestrator,
            animals,
            weight_records,
            feeding_logs,
            medicine_logs,
            vaccine_logs,
            inventory_items,
        }))
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Total queued mutations across all collections.
    pub fn pending_mutations(&self) -> Result<i64> {
        self.outbox.pending_count()
    }

    /// Start the background sync loop.
    pub async fn start_background_sync(&self) {
        self.orchestrator.start().await;
    }

    /// Stop the background sync loop and wait for it to wind down.
    pub async fn shutdown(&self) {
        self.orchestrator.stop().await;
    }

    pub fn animal_service(&self) -> &EntityService<Animal> {
        &self.animals
    }

    pub fn weight_record_service(&self) -> &EntityService<WeightRecord> {
        &self.weight_records
    }

    pub fn feeding_log_service(&self) -> &EntityService<FeedingLog> {
        &self.feeding_logs
    }

    pub fn medicine_log_service(&self) -> &EntityService<MedicineLog> {
        &self.medicine_logs
    }

    pub fn vaccine_log_service(&self) -> &EntityService<VaccineLog> {
        &self.vaccine_logs
    }

    pub fn inventory_item_service(&self) -> &EntityService<InventoryItem> {
        &self.inventory_items
    }
}
