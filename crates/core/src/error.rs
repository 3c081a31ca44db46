use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid shard id: {0}")]
    InvalidShardId(String),

    #[error("Unknown donor state: {0}")]
    UnknownDonorState(String),

    #[error("Unknown coordinator state: {0}")]
    UnknownCoordinatorState(String),

    #[error("Invalid donor state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Donor document {resharding_uuid} is invalid: {reason}")]
    InvalidDocument { resharding_uuid: Uuid, reason: String },
}
