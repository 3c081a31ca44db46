use reshard_core::{CoreError, DonorState};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DonorError {
    /// The process lost primary status while the instance was running.
    /// Persisted progress is kept; the next primary resumes from it.
    #[error("Interrupted due to replication state change")]
    InterruptedDueToReplStateChange,

    #[error("Not primary; resharding donors only run on the primary")]
    NotPrimary,

    #[error("Donor not found for resharding operation: {0}")]
    NotFound(Uuid),

    #[error("Invalid donor state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("State document for {resharding_uuid} conflicts with the persisted one: {reason}")]
    ConflictingDocument { resharding_uuid: Uuid, reason: String },

    #[error("External state error: {0}")]
    ExternalState(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),

    #[error("Invalid document: {0}")]
    Core(#[from] CoreError),

    #[error("Donor task ended before resolving its completion")]
    Abandoned,
}

impl DonorError {
    pub fn invalid_transition(from: DonorState, to: DonorState) -> Self {
        Self::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    pub fn external(reason: impl Into<String>) -> Self {
        Self::ExternalState(reason.into())
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::InterruptedDueToReplStateChange)
    }
}

pub type Result<T> = std::result::Result<T, DonorError>;
