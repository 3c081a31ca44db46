use std::sync::Arc;

use events::{Event, EventBus};
use reshard_core::CoordinatorPhaseNotification;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::service::DonorService;

/// What became of one routed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingOutcome {
    Delivered,
    /// The instance already holds this phase or a later one.
    Duplicate,
    NoInstance,
    /// Carried no donor fields, so it is not meant for donors.
    Ignored,
}

/// Routes coordinator phase changes to the live donor of the named operation.
#[derive(Clone)]
pub struct CoordinatorFieldWatcher {
    service: Arc<DonorService>,
}

impl CoordinatorFieldWatcher {
    pub fn new(service: Arc<DonorService>) -> Self {
        Self { service }
    }

    pub fn on_fields_changed(&self, notification: &CoordinatorPhaseNotification) -> RoutingOutcome {
        let id = notification.resharding_uuid;
        if notification.donor_fields.is_none() {
            debug!(resharding_uuid = %id, "Ignoring coordinator notification without donor fields");
            return RoutingOutcome::Ignored;
        }

        let Some(donor) = self.service.lookup(id) else {
            debug!(resharding_uuid = %id, "No live donor for coordinator notification");
            return RoutingOutcome::NoInstance;
        };

        if donor.on_coordinator_phase_change(notification.clone()) {
            RoutingOutcome::Delivered
        } else {
            RoutingOutcome::Duplicate
        }
    }

    /// Routes every `coordinator.fields_changed` event published on `bus`
    /// until the bus closes or the returned task is aborted.
    pub fn listen(&self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        let watcher = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if let Event::CoordinatorFieldsChanged { notification } = envelope.event {
                            watcher.on_fields_changed(&notification);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Coordinator watcher lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
