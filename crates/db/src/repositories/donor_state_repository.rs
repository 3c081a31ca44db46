use chrono::Utc;
use reshard_core::{DonorShardContext, DonorState, DonorStateDocument};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::DonorDocumentRow;
use crate::retry::write_conflict_retry;

const NS: &str = "donor_state_documents";

/// Durable store holding one state document per resharding operation.
#[derive(Clone)]
pub struct DonorStateRepository {
    pool: SqlitePool,
}

impl DonorStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new document. Fails if one already exists for the operation.
    pub async fn create(&self, doc: &DonorStateDocument) -> Result<(), DbError> {
        let row = &DonorDocumentRow::from_domain(doc, Utc::now().timestamp())?;
        let pool = &self.pool;

        let result = write_conflict_retry("insert", NS, move || async move {
            sqlx::query(
                r#"
                INSERT INTO donor_state_documents (
                    resharding_uuid, source_nss, source_uuid, temp_resharding_nss, resharding_key,
                    recipient_shards, state, abort_reason, min_fetch_timestamp,
                    created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.resharding_uuid)
            .bind(&row.source_nss)
            .bind(&row.source_uuid)
            .bind(&row.temp_resharding_nss)
            .bind(&row.resharding_key)
            .bind(&row.recipient_shards)
            .bind(&row.state)
            .bind(&row.abort_reason)
            .bind(row.min_fetch_timestamp)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(pool)
            .await
            .map_err(DbError::from)
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(DbError::Sqlx(sqlx::Error::Database(e))) if e.is_unique_violation() => {
                Err(DbError::DuplicateDonorDocument(doc.resharding_uuid))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<DonorStateDocument>, DbError> {
        let row: Option<DonorDocumentRow> = sqlx::query_as(
            r#"
            SELECT resharding_uuid, source_nss, source_uuid, temp_resharding_nss, resharding_key,
                   recipient_shards, state, abort_reason, min_fetch_timestamp,
                   created_at, updated_at
            FROM donor_state_documents
            WHERE resharding_uuid = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DonorDocumentRow::try_into_domain).transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<DonorStateDocument>, DbError> {
        let rows: Vec<DonorDocumentRow> = sqlx::query_as(
            r#"
            SELECT resharding_uuid, source_nss, source_uuid, temp_resharding_nss, resharding_key,
                   recipient_shards, state, abort_reason, min_fetch_timestamp,
                   created_at, updated_at
            FROM donor_state_documents
            ORDER BY created_at ASC, resharding_uuid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DonorDocumentRow::try_into_domain).collect()
    }

    /// Documents whose operation has not reached `Done`.
    pub async fn find_unfinished(&self) -> Result<Vec<DonorStateDocument>, DbError> {
        let rows: Vec<DonorDocumentRow> = sqlx::query_as(
            r#"
            SELECT resharding_uuid, source_nss, source_uuid, temp_resharding_nss, resharding_key,
                   recipient_shards, state, abort_reason, min_fetch_timestamp,
                   created_at, updated_at
            FROM donor_state_documents
            WHERE state != ?
            ORDER BY created_at ASC, resharding_uuid ASC
            "#,
        )
        .bind(DonorState::Done.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DonorDocumentRow::try_into_domain).collect()
    }

    /// Replaces the mutable state, but only if the stored state is still
    /// `expected`.
    ///
    /// Re-applying an update that already landed is not a conflict: if the
    /// stored context already equals `context`, the stored document is
    /// returned unchanged.
    pub async fn update_state(
        &self,
        id: Uuid,
        expected: DonorState,
        context: &DonorShardContext,
    ) -> Result<DonorStateDocument, DbError> {
        let id_str = &id.to_string();
        let pool = &self.pool;

        let rows_affected = write_conflict_retry("update", NS, move || async move {
            sqlx::query(
                r#"
                UPDATE donor_state_documents
                SET state = ?, abort_reason = ?, min_fetch_timestamp = ?, updated_at = ?
                WHERE resharding_uuid = ? AND state = ?
                "#,
            )
            .bind(context.state.as_str())
            .bind(&context.abort_reason)
            .bind(context.min_fetch_timestamp)
            .bind(Utc::now().timestamp())
            .bind(id_str)
            .bind(expected.as_str())
            .execute(pool)
            .await
            .map(|r| r.rows_affected())
            .map_err(DbError::from)
        })
        .await?;

        let stored = self
            .find_by_id(id)
            .await?
            .ok_or(DbError::DonorDocumentNotFound(id))?;

        if rows_affected == 0 && stored.mutable_state != *context {
            return Err(DbError::StateConflict {
                resharding_uuid: id,
                expected: expected.as_str().to_string(),
                actual: stored.state().as_str().to_string(),
            });
        }

        Ok(stored)
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let pool = &self.pool;
        let result = write_conflict_retry("delete", NS, move || async move {
            sqlx::query("DELETE FROM donor_state_documents WHERE resharding_uuid = ?")
                .bind(id.to_string())
                .execute(pool)
                .await
                .map_err(DbError::from)
        })
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_store;
    use reshard_core::{NamespaceString, ShardId};
    use serde_json::json;

    async fn setup_test_db() -> SqlitePool {
        open_store("sqlite::memory:").await.unwrap()
    }

    fn make_doc() -> DonorStateDocument {
        DonorStateDocument::new(
            Uuid::new_v4(),
            NamespaceString::parse("sourcedb.sourcecollection").unwrap(),
            Uuid::new_v4(),
            json!({"newKey": 1}),
            vec![
                ShardId::new("recipient1").unwrap(),
                ShardId::new("recipient2").unwrap(),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = DonorStateRepository::new(setup_test_db().await);
        let doc = make_doc();

        repo.create(&doc).await.unwrap();

        let found = repo.find_by_id(doc.resharding_uuid).await.unwrap();
        assert_eq!(found, Some(doc));
    }

    #[tokio::test]
    async fn test_create_twice_is_rejected() {
        let repo = DonorStateRepository::new(setup_test_db().await);
        let doc = make_doc();

        repo.create(&doc).await.unwrap();
        let err = repo.create(&doc).await.unwrap_err();
        assert!(matches!(err, DbError::DuplicateDonorDocument(id) if id == doc.resharding_uuid));
    }

    #[tokio::test]
    async fn test_conditional_update() {
        let repo = DonorStateRepository::new(setup_test_db().await);
        let doc = make_doc();
        repo.create(&doc).await.unwrap();

        let next = DonorShardContext {
            state: DonorState::DonatingInitialData,
            abort_reason: None,
            min_fetch_timestamp: Some(3),
        };
        let updated = repo
            .update_state(doc.resharding_uuid, DonorState::PreparingToDonate, &next)
            .await
            .unwrap();
        assert_eq!(updated.mutable_state, next);

        // Same update again is a no-op rather than a conflict.
        let again = repo
            .update_state(doc.resharding_uuid, DonorState::PreparingToDonate, &next)
            .await
            .unwrap();
        assert_eq!(again.mutable_state, next);

        // A different update from a stale expected state conflicts.
        let err = repo
            .update_state(
                doc.resharding_uuid,
                DonorState::PreparingToDonate,
                &DonorShardContext::new(DonorState::Error),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let repo = DonorStateRepository::new(setup_test_db().await);
        let id = Uuid::new_v4();

        let err = repo
            .update_state(
                id,
                DonorState::PreparingToDonate,
                &DonorShardContext::new(DonorState::Done),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DonorDocumentNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_find_unfinished_skips_done() {
        let repo = DonorStateRepository::new(setup_test_db().await);
        let active = make_doc();
        let done = make_doc().with_state(DonorState::Done);
        repo.create(&active).await.unwrap();
        repo.create(&done).await.unwrap();

        let unfinished = repo.find_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].resharding_uuid, active.resharding_uuid);
        assert_eq!(repo.find_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = DonorStateRepository::new(setup_test_db().await);
        let doc = make_doc();
        repo.create(&doc).await.unwrap();

        assert!(repo.delete(doc.resharding_uuid).await.unwrap());
        assert!(!repo.delete(doc.resharding_uuid).await.unwrap());
        assert!(repo.find_by_id(doc.resharding_uuid).await.unwrap().is_none());
    }
}
