use reshard_core::{OpType, OplogEntry, ShardId};

use super::{millis_to_datetime, parse_uuid};
use crate::error::DbError;

const TABLE: &str = "oplog";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OplogEntryRow {
    pub ts: i64,
    pub op: String,
    pub ns: String,
    pub ui: Option<String>,
    pub destined_recipient: Option<String>,
    pub o: String,
    pub o2: Option<String>,
    pub wall_time: i64,
}

impl OplogEntryRow {
    pub fn try_into_domain(self) -> Result<OplogEntry, DbError> {
        let op_type = OpType::parse(&self.op)
            .ok_or_else(|| DbError::corrupt(TABLE, format!("unknown op {:?}", self.op)))?;
        let uuid = self.ui.as_deref().map(|ui| parse_uuid(TABLE, ui)).transpose()?;
        let destined_recipient = self
            .destined_recipient
            .map(|s| ShardId::new(s).map_err(|e| DbError::corrupt(TABLE, e.to_string())))
            .transpose()?;
        let object2 = self.o2.as_deref().map(serde_json::from_str).transpose()?;

        Ok(OplogEntry {
            ts: self.ts,
            op_type,
            ns: self.ns,
            uuid,
            destined_recipient,
            object: serde_json::from_str(&self.o)?,
            object2,
            wall_time: millis_to_datetime(self.wall_time),
        })
    }
}

/// Filter for reading back oplog entries, oldest first.
#[derive(Debug, Clone, Default)]
pub struct OplogQuery {
    pub ns: Option<String>,
    pub after_ts: Option<i64>,
    pub limit: Option<i64>,
}

impl OplogQuery {
    pub fn for_ns(ns: impl Into<String>) -> Self {
        Self {
            ns: Some(ns.into()),
            ..Default::default()
        }
    }

    pub fn after(mut self, ts: i64) -> Self {
        self.after_ts = Some(ts);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}
