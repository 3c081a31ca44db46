use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CoreError;

const TEMPORARY_RESHARDING_PREFIX: &str = "system.resharding.";

/// Identity of a shard in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidShardId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ShardId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ShardId> for String {
    fn from(id: ShardId) -> Self {
        id.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fully qualified `<db>.<collection>` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "sourcedb.sourcecollection")]
pub struct NamespaceString(String);

impl NamespaceString {
    pub fn parse(ns: impl Into<String>) -> Result<Self, CoreError> {
        let full = ns.into();
        match full.find('.') {
            Some(dot) if dot > 0 && dot + 1 < full.len() => Ok(Self(full)),
            _ => Err(CoreError::InvalidNamespace(full)),
        }
    }

    pub fn from_parts(db: &str, coll: &str) -> Result<Self, CoreError> {
        Self::parse(format!("{}.{}", db, coll))
    }

    /// The namespace a resharding operation clones the collection into,
    /// derived from the source collection's UUID.
    pub fn temporary_resharding(db: &str, source_uuid: Uuid) -> Result<Self, CoreError> {
        Self::from_parts(db, &format!("{}{}", TEMPORARY_RESHARDING_PREFIX, source_uuid))
    }

    fn dot(&self) -> usize {
        self.0.find('.').unwrap_or(self.0.len())
    }

    pub fn db(&self) -> &str {
        &self.0[..self.dot()]
    }

    pub fn coll(&self) -> &str {
        self.0.get(self.dot() + 1..).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_temporary_resharding(&self) -> bool {
        self.coll().starts_with(TEMPORARY_RESHARDING_PREFIX)
    }
}

impl TryFrom<String> for NamespaceString {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NamespaceString> for String {
    fn from(ns: NamespaceString) -> Self {
        ns.0
    }
}

impl fmt::Display for NamespaceString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_parts() {
        let ns = NamespaceString::parse("sourcedb.source.collection").unwrap();
        assert_eq!(ns.db(), "sourcedb");
        assert_eq!(ns.coll(), "source.collection");
        assert_eq!(ns.to_string(), "sourcedb.source.collection");
    }

    #[test]
    fn test_namespace_rejects_missing_parts() {
        assert!(NamespaceString::parse("nodot").is_err());
        assert!(NamespaceString::parse(".coll").is_err());
        assert!(NamespaceString::parse("db.").is_err());
    }

    #[test]
    fn test_temporary_resharding_namespace() {
        let uuid = Uuid::new_v4();
        let ns = NamespaceString::temporary_resharding("sourcedb", uuid).unwrap();
        assert_eq!(ns.db(), "sourcedb");
        assert_eq!(ns.coll(), format!("system.resharding.{}", uuid));
        assert!(ns.is_temporary_resharding());
    }

    #[test]
    fn test_namespace_serde() {
        let ns: NamespaceString = serde_json::from_str("\"a.b\"").unwrap();
        assert_eq!(serde_json::to_string(&ns).unwrap(), "\"a.b\"");
        assert!(serde_json::from_str::<NamespaceString>("\"ab\"").is_err());
    }

    #[test]
    fn test_shard_id_rejects_blank() {
        assert!(ShardId::new("  ").is_err());
        assert_eq!(ShardId::new("shard0").unwrap().as_str(), "shard0");
    }
}
