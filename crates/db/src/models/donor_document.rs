use reshard_core::{DonorShardContext, DonorState, DonorStateDocument, NamespaceString, ShardId};

use super::parse_uuid;
use crate::error::DbError;

const TABLE: &str = "donor_state_documents";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DonorDocumentRow {
    pub resharding_uuid: String,
    pub source_nss: String,
    pub source_uuid: String,
    pub temp_resharding_nss: String,
    pub resharding_key: String,
    pub recipient_shards: String,
    pub state: String,
    pub abort_reason: Option<String>,
    pub min_fetch_timestamp: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DonorDocumentRow {
    pub fn try_into_domain(self) -> Result<DonorStateDocument, DbError> {
        let nss = |value: String| {
            NamespaceString::parse(value).map_err(|e| DbError::corrupt(TABLE, e.to_string()))
        };
        let state = DonorState::parse(&self.state)
            .ok_or_else(|| DbError::corrupt(TABLE, format!("unknown state {:?}", self.state)))?;
        let recipient_shards: Vec<ShardId> = serde_json::from_str(&self.recipient_shards)?;

        Ok(DonorStateDocument {
            resharding_uuid: parse_uuid(TABLE, &self.resharding_uuid)?,
            source_nss: nss(self.source_nss)?,
            source_uuid: parse_uuid(TABLE, &self.source_uuid)?,
            temp_resharding_nss: nss(self.temp_resharding_nss)?,
            resharding_key: serde_json::from_str(&self.resharding_key)?,
            recipient_shards,
            mutable_state: DonorShardContext {
                state,
                abort_reason: self.abort_reason,
                min_fetch_timestamp: self.min_fetch_timestamp,
            },
        })
    }

    pub fn from_domain(doc: &DonorStateDocument, now: i64) -> Result<Self, DbError> {
        Ok(Self {
            resharding_uuid: doc.resharding_uuid.to_string(),
            source_nss: doc.source_nss.to_string(),
            source_uuid: doc.source_uuid.to_string(),
            temp_resharding_nss: doc.temp_resharding_nss.to_string(),
            resharding_key: serde_json::to_string(&doc.resharding_key)?,
            recipient_shards: serde_json::to_string(&doc.recipient_shards)?,
            state: doc.mutable_state.state.as_str().to_string(),
            abort_reason: doc.mutable_state.abort_reason.clone(),
            min_fetch_timestamp: doc.mutable_state.min_fetch_timestamp,
            created_at: now,
            updated_at: now,
        })
    }
}
