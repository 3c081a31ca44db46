use std::sync::{Arc, RwLock};

use db::{
    CatalogRepository, CoordinatorRepository, DonorStateRepository, OplogRepository, SqlitePool,
};
use donor::{CoordinatorFieldWatcher, DonorContext, DonorService, DonorServiceConfig};
use events::EventBus;
use reshard_core::ShardId;

use crate::routes::sse::{EventBuffer, SharedEventBuffer, DEFAULT_EVENT_BUFFER_SIZE};

#[derive(Clone)]
pub struct AppState {
    pub shard_id: ShardId,
    pub donor_service: Arc<DonorService>,
    pub watcher: CoordinatorFieldWatcher,
    pub donor_repository: DonorStateRepository,
    pub catalog_repository: CatalogRepository,
    pub oplog_repository: OplogRepository,
    pub coordinator_repository: CoordinatorRepository,
    pub event_bus: EventBus,
    pub event_buffer: SharedEventBuffer,
}

impl AppState {
    /// State for a shard whose donors talk to its own catalog and store.
    pub fn new(pool: SqlitePool, config: DonorServiceConfig) -> Self {
        let event_bus = EventBus::new();
        let ctx = DonorContext::for_shard(pool.clone(), &config).with_event_bus(event_bus.clone());
        Self::with_donor_context(pool, ctx, event_bus)
    }

    /// `ctx` should publish to `event_bus` for its events to reach clients.
    pub fn with_donor_context(pool: SqlitePool, ctx: DonorContext, event_bus: EventBus) -> Self {
        let shard_id = ctx.external_state.my_shard_id();
        let donor_service = Arc::new(DonorService::new(ctx));
        let watcher = CoordinatorFieldWatcher::new(Arc::clone(&donor_service));

        Self {
            shard_id,
            donor_service,
            watcher,
            donor_repository: DonorStateRepository::new(pool.clone()),
            catalog_repository: CatalogRepository::new(pool.clone()),
            oplog_repository: OplogRepository::new(pool.clone()),
            coordinator_repository: CoordinatorRepository::new(pool),
            event_bus,
            event_buffer: Arc::new(RwLock::new(EventBuffer::new(DEFAULT_EVENT_BUFFER_SIZE))),
        }
    }
}
