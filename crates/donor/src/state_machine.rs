use std::sync::{Arc, Mutex, PoisonError};

use events::Event;
use reshard_core::{
    CoordinatorPhaseNotification, CoordinatorState, DonorShardContext, DonorState,
    DonorStateDocument,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::completion::{Completion, CompletionFuture};
use crate::context::DonorContext;
use crate::error::{DonorError, Result};
use crate::state_table::DonorStateTable;

const DEFAULT_ABORT_REASON: &str = "resharding aborted by coordinator";

/// What an instance found when it stopped waiting on the coordinator.
enum Gate {
    Ready,
    Aborted(Option<String>),
}

/// Drives one shard's donor role in one resharding operation.
///
/// Each instance runs as a single task walking the phase table from whatever
/// state its document was persisted in. Coordinator phases arrive through a
/// single-slot inbox that only moves forward; the task reads the latest phase
/// whenever it reaches a gate that depends on it.
pub struct DonorStateMachine {
    resharding_uuid: Uuid,
    doc: Mutex<DonorStateDocument>,
    inbox: watch::Sender<Option<CoordinatorPhaseNotification>>,
    interrupt: watch::Sender<bool>,
    completion: Completion,
}

impl DonorStateMachine {
    fn new(doc: DonorStateDocument) -> Self {
        let (inbox, _) = watch::channel(None);
        let (interrupt, _) = watch::channel(false);
        Self {
            resharding_uuid: doc.resharding_uuid,
            doc: Mutex::new(doc),
            inbox,
            interrupt,
            completion: Completion::new(),
        }
    }

    /// Builds an instance from `doc` and starts driving it.
    pub(crate) fn spawn(ctx: Arc<DonorContext>, doc: DonorStateDocument) -> Arc<Self> {
        let state = doc.state();
        let machine = Arc::new(Self::new(doc));

        info!(
            resharding_uuid = %machine.resharding_uuid,
            state = %state.as_str(),
            "Donor instance created"
        );
        ctx.emit_event(Event::DonorInstanceCreated {
            resharding_uuid: machine.resharding_uuid,
            state,
        });

        tokio::spawn(Arc::clone(&machine).run(ctx));
        machine
    }

    pub fn resharding_uuid(&self) -> Uuid {
        self.resharding_uuid
    }

    pub fn document(&self) -> DonorStateDocument {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn current_state(&self) -> DonorState {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner).state()
    }

    pub fn completion_future(&self) -> CompletionFuture {
        self.completion.future()
    }

    /// Latest coordinator phase this instance has accepted.
    pub fn coordinator_state(&self) -> Option<CoordinatorState> {
        self.inbox.borrow().as_ref().map(|n| n.state)
    }

    /// Offers a coordinator notification to this instance.
    ///
    /// Returns `false` when it names another operation or does not advance
    /// past the phase already held, in which case it is dropped.
    pub fn on_coordinator_phase_change(&self, notification: CoordinatorPhaseNotification) -> bool {
        if notification.resharding_uuid != self.resharding_uuid {
            warn!(
                resharding_uuid = %self.resharding_uuid,
                other = %notification.resharding_uuid,
                "Dropping notification for another resharding operation"
            );
            return false;
        }

        let state = notification.state;
        let mut pending = Some(notification);
        let accepted = self.inbox.send_if_modified(|slot| {
            let advances = slot.as_ref().map_or(true, |held| state > held.state);
            if advances {
                *slot = pending.take();
            }
            advances
        });

        debug!(
            resharding_uuid = %self.resharding_uuid,
            coordinator_state = %state.as_str(),
            accepted,
            "Coordinator phase observed"
        );
        accepted
    }

    /// Stops the instance at its next suspension point. Persisted progress
    /// is left for the next primary.
    pub(crate) fn interrupt(&self) {
        self.interrupt.send_replace(true);
    }

    async fn run(self: Arc<Self>, ctx: Arc<DonorContext>) {
        let interrupted = self.interrupt.subscribe();

        let result = tokio::select! {
            biased;
            _ = wait_for_interrupt(interrupted) => Err(DonorError::InterruptedDueToReplStateChange),
            result = self.drive(&ctx) => result,
        };

        match &result {
            Ok(()) => info!(resharding_uuid = %self.resharding_uuid, "Donor finished"),
            Err(e) if e.is_interrupted() => {
                info!(
                    resharding_uuid = %self.resharding_uuid,
                    state = %self.current_state().as_str(),
                    "Donor interrupted by role change"
                )
            }
            Err(e) => error!(resharding_uuid = %self.resharding_uuid, error = %e, "Donor failed"),
        }

        ctx.emit_event(Event::DonorCompleted {
            resharding_uuid: self.resharding_uuid,
            success: result.is_ok(),
            error: result.as_ref().err().map(ToString::to_string),
        });
        self.completion.resolve(result);
    }

    async fn drive(&self, ctx: &DonorContext) -> Result<()> {
        self.report_resumed_state(ctx).await?;
        loop {
            let doc = self.document();
            match doc.state() {
                DonorState::Unused => self.advance(ctx, &doc, DonorState::PreparingToDonate).await?,
                DonorState::PreparingToDonate => self.prepare_to_donate(ctx, &doc).await?,
                DonorState::DonatingInitialData => {
                    match self.await_coordinator(CoordinatorState::Applying).await? {
                        Gate::Ready => {
                            self.advance(ctx, &doc, DonorState::DonatingOplogEntries).await?
                        }
                        Gate::Aborted(reason) => self.abort(ctx, &doc, reason).await?,
                    }
                }
                DonorState::DonatingOplogEntries => {
                    match self.await_coordinator(CoordinatorState::BlockingWrites).await? {
                        Gate::Ready => self.block_writes(ctx, &doc).await?,
                        Gate::Aborted(reason) => self.abort(ctx, &doc, reason).await?,
                    }
                }
                DonorState::BlockingWrites => {
                    match self.await_coordinator(CoordinatorState::DecisionPersisted).await? {
                        Gate::Ready => {
                            self.drop_source_collection(ctx, &doc).await?;
                            self.advance(ctx, &doc, DonorState::Done).await?
                        }
                        Gate::Aborted(reason) => self.abort(ctx, &doc, reason).await?,
                    }
                }
                DonorState::Error => {
                    self.await_inbox(|n| n.state.has_decision()).await?;
                    info!(
                        resharding_uuid = %self.resharding_uuid,
                        ns = %doc.source_nss,
                        "Keeping source collection after abort"
                    );
                    self.advance(ctx, &doc, DonorState::Done).await?
                }
                DonorState::Done => return Ok(()),
            }
        }
    }

    /// A previous run may have committed its last state without reporting
    /// it. Reports are upserts, so sending the persisted one again is safe.
    async fn report_resumed_state(&self, ctx: &DonorContext) -> Result<()> {
        let doc = self.document();
        if matches!(doc.state(), DonorState::Unused | DonorState::PreparingToDonate) {
            return Ok(());
        }

        debug!(
            resharding_uuid = %self.resharding_uuid,
            state = %doc.state().as_str(),
            "Reporting resumed donor state"
        );
        let shard_id = ctx.external_state.my_shard_id();
        ctx.external_state
            .update_coordinator_document(self.resharding_uuid, &shard_id, &doc.mutable_state)
            .await
    }

    async fn prepare_to_donate(&self, ctx: &DonorContext, doc: &DonorStateDocument) -> Result<()> {
        let temp_nss = &doc.temp_resharding_nss;
        let readiness = async {
            ctx.external_state.refresh_catalog_cache(temp_nss).await?;
            ctx.external_state.wait_for_collection_flush(temp_nss).await
        };

        let gate = tokio::select! {
            biased;
            reason = self.await_abort() => Gate::Aborted(reason?),
            ready = readiness => {
                ready?;
                Gate::Ready
            }
        };
        if let Gate::Aborted(reason) = gate {
            return self.abort(ctx, doc, reason).await;
        }

        let fence_ts = ctx.markers.write_fence_marker(doc).await?;
        ctx.emit_event(Event::OplogMarkerWritten {
            resharding_uuid: self.resharding_uuid,
            ts: fence_ts,
            destined_recipient: None,
        });

        let mut next = doc.mutable_state.clone();
        next.state = DonorState::DonatingInitialData;
        next.min_fetch_timestamp = Some(fence_ts);
        self.transition(ctx, doc.state(), next).await
    }

    async fn block_writes(&self, ctx: &DonorContext, doc: &DonorStateDocument) -> Result<()> {
        let written = ctx.markers.write_final_op_markers(doc).await?;
        for (recipient, ts) in written {
            debug!(
                resharding_uuid = %self.resharding_uuid,
                recipient = %recipient,
                ts,
                "Final op marker written"
            );
            ctx.emit_event(Event::OplogMarkerWritten {
                resharding_uuid: self.resharding_uuid,
                ts,
                destined_recipient: Some(recipient),
            });
        }
        self.advance(ctx, doc, DonorState::BlockingWrites).await
    }

    async fn drop_source_collection(
        &self,
        ctx: &DonorContext,
        doc: &DonorStateDocument,
    ) -> Result<()> {
        let dropped = ctx
            .catalog_repo
            .drop_collection(&doc.source_nss, doc.source_uuid)
            .await?;
        if !dropped {
            debug!(
                resharding_uuid = %self.resharding_uuid,
                ns = %doc.source_nss,
                "Source collection already dropped"
            );
        }
        Ok(())
    }

    async fn abort(
        &self,
        ctx: &DonorContext,
        doc: &DonorStateDocument,
        reason: Option<String>,
    ) -> Result<()> {
        let reason = reason.unwrap_or_else(|| DEFAULT_ABORT_REASON.to_string());
        warn!(
            resharding_uuid = %self.resharding_uuid,
            state = %doc.state().as_str(),
            reason = %reason,
            "Coordinator aborted resharding"
        );

        let mut next = doc.mutable_state.clone();
        next.state = DonorState::Error;
        next.abort_reason = Some(reason);
        self.transition(ctx, doc.state(), next).await
    }

    async fn advance(
        &self,
        ctx: &DonorContext,
        doc: &DonorStateDocument,
        to: DonorState,
    ) -> Result<()> {
        let mut next = doc.mutable_state.clone();
        next.state = to;
        self.transition(ctx, doc.state(), next).await
    }

    /// Persists `next` if the stored state is still `from`, then reports it
    /// to the coordinator.
    async fn transition(
        &self,
        ctx: &DonorContext,
        from: DonorState,
        next: DonorShardContext,
    ) -> Result<()> {
        DonorStateTable::validate_transition(from, next.state)?;
        ctx.hook.before_persist(self.resharding_uuid, next.state).await;

        let stored = ctx
            .donor_repo
            .update_state(self.resharding_uuid, from, &next)
            .await?;
        *self.doc.lock().unwrap_or_else(PoisonError::into_inner) = stored;

        info!(
            resharding_uuid = %self.resharding_uuid,
            from = %from.as_str(),
            to = %next.state.as_str(),
            "Donor state transition"
        );
        ctx.emit_event(Event::DonorStateChanged {
            resharding_uuid: self.resharding_uuid,
            from_state: from,
            to_state: next.state,
        });

        let shard_id = ctx.external_state.my_shard_id();
        ctx.external_state
            .update_coordinator_document(self.resharding_uuid, &shard_id, &next)
            .await
    }

    async fn await_coordinator(&self, phase: CoordinatorState) -> Result<Gate> {
        let seen = self
            .await_inbox(|n| n.state.is_abort() || n.state.reached(phase))
            .await?;
        if seen.state.is_abort() {
            Ok(Gate::Aborted(seen.abort_reason))
        } else {
            Ok(Gate::Ready)
        }
    }

    async fn await_abort(&self) -> Result<Option<String>> {
        let seen = self.await_inbox(|n| n.state.is_abort()).await?;
        Ok(seen.abort_reason)
    }

    async fn await_inbox<F>(&self, accept: F) -> Result<CoordinatorPhaseNotification>
    where
        F: Fn(&CoordinatorPhaseNotification) -> bool,
    {
        let mut rx = self.inbox.subscribe();
        debug!(resharding_uuid = %self.resharding_uuid, "Waiting for coordinator");
        let seen = rx
            .wait_for(|slot| slot.as_ref().is_some_and(|n| accept(n)))
            .await
            .map_err(|_| DonorError::Abandoned)?
            .clone();
        seen.ok_or(DonorError::Abandoned)
    }
}

async fn wait_for_interrupt(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|interrupted| *interrupted).await;
}

impl std::fmt::Debug for DonorStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DonorStateMachine")
            .field("resharding_uuid", &self.resharding_uuid)
            .field("state", &self.current_state())
            .field("coordinator_state", &self.coordinator_state())
            .finish()
    }
}
