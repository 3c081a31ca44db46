use chrono::Utc;
use reshard_core::{DonorShardContext, ShardId};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{CoordinatorDonorReport, CoordinatorDonorReportRow};
use crate::retry::write_conflict_retry;

const NS: &str = "config.reshardingOperations";

/// Donor progress as recorded in the coordinator's operation document.
#[derive(Clone)]
pub struct CoordinatorRepository {
    pool: SqlitePool,
}

impl CoordinatorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_donor_report(
        &self,
        resharding_uuid: Uuid,
        shard_id: &ShardId,
        context: &DonorShardContext,
    ) -> Result<(), DbError> {
        let pool = &self.pool;
        let id_str = &resharding_uuid.to_string();
        let shard = shard_id.as_str();

        write_conflict_retry("upsert_donor_report", NS, move || async move {
            sqlx::query(
                r#"
                INSERT INTO coordinator_donor_reports
                    (resharding_uuid, shard_id, state, abort_reason, min_fetch_timestamp,
                     updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT (resharding_uuid, shard_id) DO UPDATE SET
                    state = excluded.state,
                    abort_reason = excluded.abort_reason,
                    min_fetch_timestamp = excluded.min_fetch_timestamp,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(id_str)
            .bind(shard)
            .bind(context.state.as_str())
            .bind(&context.abort_reason)
            .bind(context.min_fetch_timestamp)
            .bind(Utc::now().timestamp())
            .execute(pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn find_by_operation(
        &self,
        resharding_uuid: Uuid,
    ) -> Result<Vec<CoordinatorDonorReport>, DbError> {
        let rows: Vec<CoordinatorDonorReportRow> = sqlx::query_as(
            r#"
            SELECT resharding_uuid, shard_id, state, abort_reason, min_fetch_timestamp, updated_at
            FROM coordinator_donor_reports
            WHERE resharding_uuid = ?
            ORDER BY shard_id ASC
            "#,
        )
        .bind(resharding_uuid.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(CoordinatorDonorReportRow::try_into_domain)
            .collect()
    }
}
