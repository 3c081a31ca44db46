use chrono::Utc;
use reshard_core::{CollectionEntry, NamespaceString};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::CollectionRow;
use crate::retry::write_conflict_retry;

/// The shard's local collection catalog.
#[derive(Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a collection. Registering the same name with the same UUID
    /// again is a no-op; a different UUID under an existing name is refused.
    pub async fn create_collection(
        &self,
        ns: &NamespaceString,
        uuid: Uuid,
    ) -> Result<CollectionEntry, DbError> {
        let pool = &self.pool;
        let ns_str = ns.as_str();
        let uuid_str = &uuid.to_string();

        write_conflict_retry("create_collection", ns_str, move || async move {
            sqlx::query("INSERT OR IGNORE INTO collections (ns, uuid, created_at) VALUES (?, ?, ?)")
                .bind(ns_str)
                .bind(uuid_str)
                .bind(Utc::now().timestamp())
                .execute(pool)
                .await?;
            Ok(())
        })
        .await?;

        match self.find_by_ns(ns).await? {
            Some(entry) if entry.uuid == uuid => Ok(entry),
            _ => Err(DbError::NamespaceExists { ns: ns.to_string() }),
        }
    }

    pub async fn find_by_ns(
        &self,
        ns: &NamespaceString,
    ) -> Result<Option<CollectionEntry>, DbError> {
        let row: Option<CollectionRow> =
            sqlx::query_as("SELECT ns, uuid, created_at FROM collections WHERE ns = ?")
                .bind(ns.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(CollectionRow::try_into_domain).transpose()
    }

    pub async fn list(&self) -> Result<Vec<CollectionEntry>, DbError> {
        let rows: Vec<CollectionRow> =
            sqlx::query_as("SELECT ns, uuid, created_at FROM collections ORDER BY ns ASC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(CollectionRow::try_into_domain).collect()
    }

    /// Drops `ns` only while it still carries `uuid`. Returns whether a
    /// collection was removed; a missing or re-created collection is left as is.
    pub async fn drop_collection(&self, ns: &NamespaceString, uuid: Uuid) -> Result<bool, DbError> {
        let pool = &self.pool;
        let ns_str = ns.as_str();
        let uuid_str = &uuid.to_string();

        let dropped = write_conflict_retry("drop_collection", ns_str, move || async move {
            let result = sqlx::query("DELETE FROM collections WHERE ns = ? AND uuid = ?")
                .bind(ns_str)
                .bind(uuid_str)
                .execute(pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
        .await?;

        if dropped {
            tracing::info!(ns = %ns, uuid = %uuid, "Dropped collection");
        }
        Ok(dropped)
    }
}
