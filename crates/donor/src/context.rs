use std::sync::Arc;

use db::{
    CatalogRepository, CoordinatorRepository, DonorStateRepository, OplogRepository, SqlitePool,
};
use events::{Event, EventBus, EventEnvelope};

use crate::config::DonorServiceConfig;
use crate::external_state::{ExternalState, ShardExternalState};
use crate::hooks::{NoopTransitionHook, TransitionHook};
use crate::marker_writer::OplogMarkerWriter;

/// Everything a donor instance reaches outside itself. Shared by all
/// instances of one service.
pub struct DonorContext {
    pub donor_repo: DonorStateRepository,
    pub catalog_repo: CatalogRepository,
    pub markers: OplogMarkerWriter,
    pub external_state: Arc<dyn ExternalState>,
    pub hook: Arc<dyn TransitionHook>,
    pub event_bus: Option<EventBus>,
}

impl DonorContext {
    pub fn new(pool: SqlitePool, external_state: Arc<dyn ExternalState>) -> Self {
        Self {
            donor_repo: DonorStateRepository::new(pool.clone()),
            catalog_repo: CatalogRepository::new(pool.clone()),
            markers: OplogMarkerWriter::new(OplogRepository::new(pool)),
            external_state,
            hook: Arc::new(NoopTransitionHook),
            event_bus: None,
        }
    }

    /// Context for a real shard, backed entirely by its own store.
    pub fn for_shard(pool: SqlitePool, config: &DonorServiceConfig) -> Self {
        let external_state = ShardExternalState::new(
            config.shard_id.clone(),
            CatalogRepository::new(pool.clone()),
            CoordinatorRepository::new(pool.clone()),
            config.readiness_poll_interval,
        );
        Self::new(pool, Arc::new(external_state))
    }

    pub fn with_transition_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn emit_event(&self, event: Event) {
        if let Some(ref bus) = self.event_bus {
            bus.publish(EventEnvelope::new(event));
        }
    }
}
