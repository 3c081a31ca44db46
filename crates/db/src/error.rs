use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Donor document not found: {0}")]
    DonorDocumentNotFound(Uuid),

    #[error("Donor document already exists: {0}")]
    DuplicateDonorDocument(Uuid),

    #[error("Donor document {resharding_uuid} is in state {actual}, expected {expected}")]
    StateConflict {
        resharding_uuid: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Namespace {ns} already exists with a different UUID")]
    NamespaceExists { ns: String },

    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn corrupt(table: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            table,
            reason: reason.into(),
        }
    }

    /// Whether the store rejected the write because another writer held the
    /// database (SQLITE_BUSY / SQLITE_LOCKED and their extended codes).
    pub fn is_write_conflict(&self) -> bool {
        let DbError::Sqlx(sqlx::Error::Database(err)) = self else {
            return false;
        };
        err.code()
            .and_then(|code| code.parse::<i64>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_conflicts() {
        assert!(!DbError::DonorDocumentNotFound(Uuid::new_v4()).is_write_conflict());
        assert!(!DbError::Sqlx(sqlx::Error::RowNotFound).is_write_conflict());
    }

    #[test]
    fn test_state_conflict_display() {
        let id = Uuid::new_v4();
        let err = DbError::StateConflict {
            resharding_uuid: id,
            expected: "blocking_writes".to_string(),
            actual: "error".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("expected blocking_writes"));
    }
}
