use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::namespace::NamespaceString;

/// A collection registered in the shard's local catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct CollectionEntry {
    pub ns: NamespaceString,
    pub uuid: Uuid,
    pub created_at: DateTime<Utc>,
}
