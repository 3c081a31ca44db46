use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use utoipa::ToSchema;
use uuid::Uuid;

use super::namespace::{NamespaceString, ShardId};
use crate::error::CoreError;

/// Donor phase, in the order a successful operation walks through them.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DonorState {
    #[default]
    Unused,
    PreparingToDonate,
    DonatingInitialData,
    DonatingOplogEntries,
    BlockingWrites,
    Error,
    Done,
}

impl DonorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::PreparingToDonate => "preparing_to_donate",
            Self::DonatingInitialData => "donating_initial_data",
            Self::DonatingOplogEntries => "donating_oplog_entries",
            Self::BlockingWrites => "blocking_writes",
            Self::Error => "error",
            Self::Done => "done",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unused" => Some(Self::Unused),
            "preparing_to_donate" => Some(Self::PreparingToDonate),
            "donating_initial_data" => Some(Self::DonatingInitialData),
            "donating_oplog_entries" => Some(Self::DonatingOplogEntries),
            "blocking_writes" => Some(Self::BlockingWrites),
            "error" => Some(Self::Error),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Whether an abort may still move this state to `Error`.
    pub fn is_abortable(&self) -> bool {
        !matches!(self, Self::Error | Self::Done)
    }
}

/// The mutable portion of the donor document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonorShardContext {
    pub state: DonorState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    /// Oplog position of the fence marker written on entering
    /// `DonatingInitialData`. Recipients start fetching from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fetch_timestamp: Option<i64>,
}

impl DonorShardContext {
    pub fn new(state: DonorState) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }
}

/// Durable per-operation record owned by one donor instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DonorStateDocument {
    #[serde(rename = "reshardingUUID")]
    pub resharding_uuid: Uuid,
    pub source_nss: NamespaceString,
    #[serde(rename = "sourceUUID")]
    pub source_uuid: Uuid,
    pub temp_resharding_nss: NamespaceString,
    #[schema(value_type = Object)]
    pub resharding_key: serde_json::Value,
    pub recipient_shards: Vec<ShardId>,
    pub mutable_state: DonorShardContext,
}

impl DonorStateDocument {
    /// Builds a fresh document in `PreparingToDonate` with a temporary
    /// namespace derived from the source collection.
    pub fn new(
        resharding_uuid: Uuid,
        source_nss: NamespaceString,
        source_uuid: Uuid,
        resharding_key: serde_json::Value,
        recipient_shards: Vec<ShardId>,
    ) -> Result<Self, CoreError> {
        let temp_resharding_nss =
            NamespaceString::temporary_resharding(source_nss.db(), source_uuid)?;
        let doc = Self {
            resharding_uuid,
            source_nss,
            source_uuid,
            temp_resharding_nss,
            resharding_key,
            recipient_shards,
            mutable_state: DonorShardContext::new(DonorState::PreparingToDonate),
        };
        doc.validate()?;
        Ok(doc)
    }

    pub fn state(&self) -> DonorState {
        self.mutable_state.state
    }

    pub fn with_state(mut self, state: DonorState) -> Self {
        self.mutable_state.state = state;
        self
    }

    /// Checks the immutable fields a donor relies on.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |reason: &str| CoreError::InvalidDocument {
            resharding_uuid: self.resharding_uuid,
            reason: reason.to_string(),
        };

        if self.recipient_shards.is_empty() {
            return Err(invalid("recipient shard list is empty"));
        }
        let mut seen = HashSet::new();
        if !self.recipient_shards.iter().all(|s| seen.insert(s)) {
            return Err(invalid("recipient shard list contains duplicates"));
        }
        if !self.resharding_key.is_object() {
            return Err(invalid("resharding key must be an object"));
        }
        if self.source_nss == self.temp_resharding_nss {
            return Err(invalid("temporary namespace equals source namespace"));
        }
        Ok(())
    }
}
