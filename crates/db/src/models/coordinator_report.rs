use chrono::{DateTime, Utc};
use reshard_core::{DonorShardContext, DonorState, ShardId};
use uuid::Uuid;

use super::{parse_uuid, timestamp_to_datetime};
use crate::error::DbError;

const TABLE: &str = "coordinator_donor_reports";

/// One donor's entry in the coordinator's view of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorDonorReport {
    pub resharding_uuid: Uuid,
    pub shard_id: ShardId,
    pub context: DonorShardContext,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CoordinatorDonorReportRow {
    pub resharding_uuid: String,
    pub shard_id: String,
    pub state: String,
    pub abort_reason: Option<String>,
    pub min_fetch_timestamp: Option<i64>,
    pub updated_at: i64,
}

impl CoordinatorDonorReportRow {
    pub fn try_into_domain(self) -> Result<CoordinatorDonorReport, DbError> {
        let state = DonorState::parse(&self.state)
            .ok_or_else(|| DbError::corrupt(TABLE, format!("unknown state {:?}", self.state)))?;
        Ok(CoordinatorDonorReport {
            resharding_uuid: parse_uuid(TABLE, &self.resharding_uuid)?,
            shard_id: ShardId::new(self.shard_id)
                .map_err(|e| DbError::corrupt(TABLE, e.to_string()))?,
            context: DonorShardContext {
                state,
                abort_reason: self.abort_reason,
                min_fetch_timestamp: self.min_fetch_timestamp,
            },
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}
