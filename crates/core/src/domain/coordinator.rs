use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::donor::DonorStateDocument;
use super::namespace::{NamespaceString, ShardId};

/// Phase reported by the resharding coordinator, as seen by donors.
///
/// The success path is ordered; a later phase implies every earlier one has
/// been passed. `Error` sits outside that order and is checked first.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    Applying,
    BlockingWrites,
    DecisionPersisted,
    Error,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applying => "applying",
            Self::BlockingWrites => "blocking_writes",
            Self::DecisionPersisted => "decision_persisted",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applying" => Some(Self::Applying),
            "blocking_writes" => Some(Self::BlockingWrites),
            "decision_persisted" => Some(Self::DecisionPersisted),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// True when this phase means the coordinator has durably decided the
    /// outcome, whether commit or abort.
    pub fn has_decision(&self) -> bool {
        matches!(self, Self::DecisionPersisted | Self::Error)
    }

    /// True when the success path has reached at least `phase`.
    pub fn reached(&self, phase: CoordinatorState) -> bool {
        !self.is_abort() && *self >= phase
    }
}

/// Donor-relevant metadata the coordinator publishes with each phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonorFields {
    pub temp_resharding_nss: NamespaceString,
    #[schema(value_type = Object)]
    pub resharding_key: serde_json::Value,
    pub recipient_shards: Vec<ShardId>,
}

/// Inbound push from the coordinator naming one resharding operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorPhaseNotification {
    #[serde(rename = "reshardingUUID")]
    pub resharding_uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub donor_fields: Option<DonorFields>,
    pub state: CoordinatorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl CoordinatorPhaseNotification {
    /// Builds the notification a coordinator would send for `doc` at `state`.
    pub fn for_document(doc: &DonorStateDocument, state: CoordinatorState) -> Self {
        Self {
            resharding_uuid: doc.resharding_uuid,
            donor_fields: Some(DonorFields {
                temp_resharding_nss: doc.temp_resharding_nss.clone(),
                resharding_key: doc.resharding_key.clone(),
                recipient_shards: doc.recipient_shards.clone(),
            }),
            state,
            abort_reason: None,
        }
    }

    pub fn with_abort_reason(mut self, reason: impl Into<String>) -> Self {
        self.abort_reason = Some(reason.into());
        self
    }
}
