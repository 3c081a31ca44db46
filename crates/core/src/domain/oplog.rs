use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::namespace::ShardId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub enum OpType {
    /// Carries no data mutation; used for fences and routing signals.
    #[serde(rename = "n")]
    Noop,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Noop => "n",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "n" => Some(Self::Noop),
            _ => None,
        }
    }
}

/// A committed entry in the shard's ordered operation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OplogEntry {
    pub ts: i64,
    #[serde(rename = "op")]
    pub op_type: OpType,
    pub ns: String,
    #[serde(rename = "ui", skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destined_recipient: Option<ShardId>,
    #[serde(rename = "o")]
    #[schema(value_type = Object)]
    pub object: serde_json::Value,
    #[serde(rename = "o2", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub object2: Option<serde_json::Value>,
    pub wall_time: DateTime<Utc>,
}

/// An entry waiting to be appended; the log assigns `ts` and `wall_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateOplogEntry {
    pub op_type: OpType,
    pub ns: String,
    pub uuid: Option<Uuid>,
    pub destined_recipient: Option<ShardId>,
    pub object: serde_json::Value,
    pub object2: Option<serde_json::Value>,
}

impl CreateOplogEntry {
    pub fn noop(ns: impl Into<String>, object: serde_json::Value) -> Self {
        Self {
            op_type: OpType::Noop,
            ns: ns.into(),
            uuid: None,
            destined_recipient: None,
            object,
            object2: None,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_destined_recipient(mut self, shard: ShardId) -> Self {
        self.destined_recipient = Some(shard);
        self
    }

    pub fn with_object2(mut self, object2: serde_json::Value) -> Self {
        self.object2 = Some(object2);
        self
    }
}
