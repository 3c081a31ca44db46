//! Test doubles for driving donors without a real shard around them.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reshard_core::{DonorShardContext, DonorState, NamespaceString, ShardId};
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{DonorError, Result};
use crate::external_state::ExternalState;
use crate::hooks::TransitionHook;

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalCall {
    RefreshCatalogCache(NamespaceString),
    WaitForCollectionFlush(NamespaceString),
    UpdateCoordinatorDocument {
        resharding_uuid: Uuid,
        shard_id: ShardId,
        context: DonorShardContext,
    },
}

/// External state that answers immediately and remembers every call.
///
/// Collection flushes can be held open with [`hold_collection_flush`], and
/// a coordinator report for a chosen state can be made to fail once with
/// [`fail_next_report`].
///
/// [`hold_collection_flush`]: ExternalStateForTest::hold_collection_flush
/// [`fail_next_report`]: ExternalStateForTest::fail_next_report
pub struct ExternalStateForTest {
    shard_id: ShardId,
    calls: Mutex<Vec<ExternalCall>>,
    failing_reports: Mutex<HashSet<DonorState>>,
    flush_held: watch::Sender<bool>,
}

impl ExternalStateForTest {
    pub fn new(shard_id: ShardId) -> Self {
        let (flush_held, _) = watch::channel(false);
        Self {
            shard_id,
            calls: Mutex::new(Vec::new()),
            failing_reports: Mutex::new(HashSet::new()),
            flush_held,
        }
    }

    /// The next report of `state` fails instead of being recorded.
    pub fn fail_next_report(&self, state: DonorState) {
        self.failing_reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(state);
    }

    /// Makes `wait_for_collection_flush` block until released.
    pub fn hold_collection_flush(&self) {
        self.flush_held.send_replace(true);
    }

    pub fn release_collection_flush(&self) {
        self.flush_held.send_replace(false);
    }

    /// Reports of `state` that carried a min fetch timestamp.
    pub fn reported_min_fetch_timestamps(&self, state: DonorState) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ExternalCall::UpdateCoordinatorDocument { context, .. }
                    if context.state == state =>
                {
                    context.min_fetch_timestamp
                }
                _ => None,
            })
            .collect()
    }

    pub fn calls(&self) -> Vec<ExternalCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// States reported to the coordinator, oldest first.
    pub fn reported_states(&self) -> Vec<DonorState> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ExternalCall::UpdateCoordinatorDocument { context, .. } => Some(context.state),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ExternalCall) {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(call);
    }
}

#[async_trait]
impl ExternalState for ExternalStateForTest {
    fn my_shard_id(&self) -> ShardId {
        self.shard_id.clone()
    }

    async fn refresh_catalog_cache(&self, nss: &NamespaceString) -> Result<()> {
        self.record(ExternalCall::RefreshCatalogCache(nss.clone()));
        Ok(())
    }

    async fn wait_for_collection_flush(&self, nss: &NamespaceString) -> Result<()> {
        self.record(ExternalCall::WaitForCollectionFlush(nss.clone()));
        let mut held = self.flush_held.subscribe();
        let _ = held.wait_for(|held| !*held).await;
        Ok(())
    }

    async fn update_coordinator_document(
        &self,
        resharding_uuid: Uuid,
        shard_id: &ShardId,
        context: &DonorShardContext,
    ) -> Result<()> {
        let fail = self
            .failing_reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&context.state);
        if fail {
            return Err(DonorError::external(format!(
                "coordinator unreachable while reporting {}",
                context.state.as_str()
            )));
        }

        self.record(ExternalCall::UpdateCoordinatorDocument {
            resharding_uuid,
            shard_id: shard_id.clone(),
            context: context.clone(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
struct TransitionGates {
    paused: HashSet<DonorState>,
    reached: HashSet<DonorState>,
}

/// Holds donors right before they persist chosen states.
///
/// A paused state stays paused across instances, so a donor rebuilt after a
/// step-up stops at the same point until the state is `unset`.
#[derive(Debug)]
pub struct StateTransitionController {
    gates: watch::Sender<TransitionGates>,
}

impl StateTransitionController {
    pub fn new() -> Arc<Self> {
        let (gates, _) = watch::channel(TransitionGates::default());
        Arc::new(Self { gates })
    }

    pub fn pause(&self, state: DonorState) {
        self.gates.send_modify(|g| {
            g.paused.insert(state);
        });
    }

    pub fn pause_all(&self, states: &[DonorState]) {
        self.gates.send_modify(|g| g.paused.extend(states.iter().copied()));
    }

    pub fn unset(&self, state: DonorState) {
        self.gates.send_modify(|g| {
            g.paused.remove(&state);
        });
    }

    /// Resolves once some donor has arrived at the transition into `state`.
    pub async fn wait(&self, state: DonorState) {
        let mut rx = self.gates.subscribe();
        let _ = rx.wait_for(|g| g.reached.contains(&state)).await;
    }
}

#[async_trait]
impl TransitionHook for StateTransitionController {
    async fn before_persist(&self, _resharding_uuid: Uuid, to: DonorState) {
        self.gates.send_modify(|g| {
            g.reached.insert(to);
        });
        let mut rx = self.gates.subscribe();
        let _ = rx.wait_for(|g| !g.paused.contains(&to)).await;
    }
}
