use async_trait::async_trait;
use reshard_core::DonorState;
use uuid::Uuid;

/// Observer invoked right before a donor persists a new state.
///
/// Returning only once the hook allows it lets tests hold an instance at an
/// exact point in its phase table.
#[async_trait]
pub trait TransitionHook: Send + Sync {
    async fn before_persist(&self, resharding_uuid: Uuid, to: DonorState);
}

pub struct NoopTransitionHook;

#[async_trait]
impl TransitionHook for NoopTransitionHook {
    async fn before_persist(&self, _resharding_uuid: Uuid, _to: DonorState) {}
}
