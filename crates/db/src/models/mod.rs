mod collection;
mod coordinator_report;
mod donor_document;
mod oplog_entry;

pub use collection::*;
pub use coordinator_report::*;
pub use donor_document::*;
pub use oplog_entry::*;

use chrono::{DateTime, TimeZone, Utc};

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}

pub(crate) fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

pub(crate) fn parse_uuid(table: &'static str, value: &str) -> Result<uuid::Uuid, crate::DbError> {
    uuid::Uuid::parse_str(value)
        .map_err(|e| crate::DbError::corrupt(table, format!("bad uuid {:?}: {}", value, e)))
}
