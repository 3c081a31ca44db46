use reshard_core::{CollectionEntry, NamespaceString};

use super::{parse_uuid, timestamp_to_datetime};
use crate::error::DbError;

const TABLE: &str = "collections";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CollectionRow {
    pub ns: String,
    pub uuid: String,
    pub created_at: i64,
}

impl CollectionRow {
    pub fn try_into_domain(self) -> Result<CollectionEntry, DbError> {
        Ok(CollectionEntry {
            ns: NamespaceString::parse(self.ns)
                .map_err(|e| DbError::corrupt(TABLE, e.to_string()))?,
            uuid: parse_uuid(TABLE, &self.uuid)?,
            created_at: timestamp_to_datetime(self.created_at),
        })
    }
}
