use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard, Weak};

use db::DbError;
use events::Event;
use reshard_core::DonorStateDocument;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::DonorContext;
use crate::error::{DonorError, Result};
use crate::state_machine::DonorStateMachine;

#[derive(Default)]
struct Registry {
    primary: bool,
    instances: HashMap<Uuid, Arc<DonorStateMachine>>,
}

/// Owns the live donor instances of this shard.
///
/// Instances only exist while the shard is primary: `step_up` rebuilds them
/// from persisted documents and `step_down` interrupts and forgets them all.
/// An instance leaves the registry on its own once its run resolves.
pub struct DonorService {
    ctx: Arc<DonorContext>,
    registry: Arc<RwLock<Registry>>,
}

impl DonorService {
    pub fn new(ctx: DonorContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            registry: Arc::new(RwLock::new(Registry::default())),
        }
    }

    pub fn context(&self) -> &Arc<DonorContext> {
        &self.ctx
    }

    pub fn is_primary(&self) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .primary
    }

    /// Becomes primary and resumes every unfinished operation from its
    /// persisted state. Returns the number of live instances afterwards.
    pub async fn step_up(&self) -> Result<usize> {
        self.registry_mut().primary = true;
        info!("Stepped up; rebuilding donor instances");
        self.ctx.emit_event(Event::RoleChanged { primary: true });

        for doc in self.ctx.donor_repo.find_unfinished().await? {
            debug!(
                resharding_uuid = %doc.resharding_uuid,
                state = %doc.state().as_str(),
                "Resuming donor"
            );
            self.get_or_spawn(doc)?;
        }

        Ok(self.registry_read_len())
    }

    /// Gives up primary status. Every live instance is interrupted and its
    /// completion resolves with `InterruptedDueToReplStateChange`.
    pub fn step_down(&self) -> usize {
        let drained: Vec<_> = {
            let mut registry = self.registry_mut();
            registry.primary = false;
            registry.instances.drain().map(|(_, donor)| donor).collect()
        };

        for donor in &drained {
            donor.interrupt();
        }
        info!(interrupted = drained.len(), "Stepped down; donor instances interrupted");
        self.ctx.emit_event(Event::RoleChanged { primary: false });
        drained.len()
    }

    /// Persists a new operation's document ahead of its first instance.
    pub async fn insert_state_document(&self, doc: &DonorStateDocument) -> Result<()> {
        doc.validate()?;
        self.ctx.donor_repo.create(doc).await?;
        info!(resharding_uuid = %doc.resharding_uuid, "Inserted donor state document");
        Ok(())
    }

    /// Returns the live instance for `initial`'s operation, building one if
    /// needed. A persisted document wins over `initial`; if none exists,
    /// `initial` is inserted first.
    pub async fn get_or_create(
        &self,
        initial: &DonorStateDocument,
    ) -> Result<Arc<DonorStateMachine>> {
        let id = initial.resharding_uuid;
        if let Some(existing) = self.lookup_if_primary(id)? {
            check_compatible(initial, &existing.document())?;
            return Ok(existing);
        }

        initial.validate()?;
        let doc = match self.ctx.donor_repo.find_by_id(id).await? {
            Some(persisted) => persisted,
            None => match self.ctx.donor_repo.create(initial).await {
                Ok(()) => initial.clone(),
                Err(DbError::DuplicateDonorDocument(_)) => self
                    .ctx
                    .donor_repo
                    .find_by_id(id)
                    .await?
                    .ok_or(DonorError::NotFound(id))?,
                Err(e) => return Err(e.into()),
            },
        };
        check_compatible(initial, &doc)?;

        self.get_or_spawn(doc)
    }

    /// Drops the instance for `resharding_uuid` from the registry,
    /// interrupting it if it is still running. Used when a finished
    /// operation's document is reaped.
    pub fn forget(&self, resharding_uuid: Uuid) -> bool {
        let removed = self.registry_mut().instances.remove(&resharding_uuid);
        match removed {
            Some(donor) => {
                if !donor.completion_future().is_ready() {
                    donor.interrupt();
                }
                debug!(resharding_uuid = %resharding_uuid, "Forgot donor instance");
                true
            }
            None => false,
        }
    }

    pub fn lookup(&self, resharding_uuid: Uuid) -> Option<Arc<DonorStateMachine>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .get(&resharding_uuid)
            .cloned()
    }

    pub fn instances(&self) -> Vec<Arc<DonorStateMachine>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .values()
            .cloned()
            .collect()
    }

    fn lookup_if_primary(&self, resharding_uuid: Uuid) -> Result<Option<Arc<DonorStateMachine>>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        if !registry.primary {
            return Err(DonorError::NotPrimary);
        }
        Ok(registry
            .instances
            .get(&resharding_uuid)
            .filter(|donor| !donor.completion_future().is_ready())
            .cloned())
    }

    fn get_or_spawn(&self, doc: DonorStateDocument) -> Result<Arc<DonorStateMachine>> {
        let mut registry = self.registry_mut();
        if !registry.primary {
            return Err(DonorError::NotPrimary);
        }
        if let Some(existing) = registry.instances.get(&doc.resharding_uuid) {
            // A resolved instance may not have been evicted yet.
            if !existing.completion_future().is_ready() {
                return Ok(Arc::clone(existing));
            }
        }

        let id = doc.resharding_uuid;
        let donor = DonorStateMachine::spawn(Arc::clone(&self.ctx), doc);
        registry.instances.insert(id, Arc::clone(&donor));
        self.evict_on_completion(&donor);
        Ok(donor)
    }

    fn evict_on_completion(&self, donor: &Arc<DonorStateMachine>) {
        let registry = Arc::clone(&self.registry);
        let completion = donor.completion_future();
        let id = donor.resharding_uuid();
        let spawned = Arc::downgrade(donor);

        tokio::spawn(async move {
            let outcome = completion.wait().await;
            let mut registry = registry.write().unwrap_or_else(PoisonError::into_inner);
            let current = registry
                .instances
                .get(&id)
                .is_some_and(|d| Weak::ptr_eq(&Arc::downgrade(d), &spawned));
            if current {
                registry.instances.remove(&id);
                debug!(resharding_uuid = %id, success = outcome.is_ok(), "Evicted finished donor");
            }
        });
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_read_len(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .instances
            .len()
    }
}

/// The immutable fields of a caller's document must match what is stored.
fn check_compatible(initial: &DonorStateDocument, stored: &DonorStateDocument) -> Result<()> {
    let mismatch = if initial.source_nss != stored.source_nss {
        Some("source namespace")
    } else if initial.source_uuid != stored.source_uuid {
        Some("source collection UUID")
    } else if initial.temp_resharding_nss != stored.temp_resharding_nss {
        Some("temporary namespace")
    } else if initial.resharding_key != stored.resharding_key {
        Some("resharding key")
    } else if initial.recipient_shards != stored.recipient_shards {
        Some("recipient shards")
    } else {
        None
    };

    match mismatch {
        Some(field) => Err(DonorError::ConflictingDocument {
            resharding_uuid: initial.resharding_uuid,
            reason: format!("{} differs", field),
        }),
        None => Ok(()),
    }
}
