use chrono::Utc;
use reshard_core::{CreateOplogEntry, OplogEntry};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbError;
use crate::models::{OplogEntryRow, OplogQuery};
use crate::retry::write_conflict_retry;

const NS: &str = "oplog";

/// Column values of an entry, serialized once so lookups compare exact text.
struct EncodedEntry {
    op: &'static str,
    ns: String,
    ui: Option<String>,
    destined_recipient: Option<String>,
    o: String,
    o2: Option<String>,
}

impl EncodedEntry {
    fn encode(entry: &CreateOplogEntry) -> Result<Self, DbError> {
        Ok(Self {
            op: entry.op_type.as_str(),
            ns: entry.ns.clone(),
            ui: entry.uuid.map(|u| u.to_string()),
            destined_recipient: entry.destined_recipient.as_ref().map(|s| s.to_string()),
            o: serde_json::to_string(&entry.object)?,
            o2: entry.object2.as_ref().map(serde_json::to_string).transpose()?,
        })
    }
}

#[derive(Clone)]
pub struct OplogRepository {
    pool: SqlitePool,
}

impl OplogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends each entry unless an identical one is already in the log.
    ///
    /// Runs as one transaction and returns the position of every entry, in
    /// input order, whether it was written now or found from an earlier
    /// attempt.
    pub async fn append_unique(&self, entries: &[CreateOplogEntry]) -> Result<Vec<i64>, DbError> {
        let encoded = entries
            .iter()
            .map(EncodedEntry::encode)
            .collect::<Result<Vec<_>, _>>()?;
        let encoded = &encoded;
        let pool = &self.pool;

        write_conflict_retry("append_unique", NS, move || async move {
            let mut tx = pool.begin().await?;
            let mut positions = Vec::with_capacity(encoded.len());

            for entry in encoded {
                let ts = match find_equivalent(&mut tx, entry).await? {
                    Some(ts) => ts,
                    None => insert(&mut tx, entry).await?,
                };
                positions.push(ts);
            }

            tx.commit().await?;
            Ok(positions)
        })
        .await
    }

    pub async fn find(&self, query: &OplogQuery) -> Result<Vec<OplogEntry>, DbError> {
        let rows: Vec<OplogEntryRow> = sqlx::query_as(
            r#"
            SELECT ts, op, ns, ui, destined_recipient, o, o2, wall_time
            FROM oplog
            WHERE (? IS NULL OR ns = ?) AND ts > ?
            ORDER BY ts ASC
            LIMIT ?
            "#,
        )
        .bind(&query.ns)
        .bind(&query.ns)
        .bind(query.after_ts.unwrap_or(0))
        .bind(query.limit.unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OplogEntryRow::try_into_domain).collect()
    }
}

async fn find_equivalent(
    conn: &mut SqliteConnection,
    entry: &EncodedEntry,
) -> Result<Option<i64>, sqlx::Error> {
    let existing: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT ts FROM oplog
        WHERE op = ? AND ns = ? AND ui IS ? AND destined_recipient IS ? AND o = ? AND o2 IS ?
        ORDER BY ts ASC
        LIMIT 1
        "#,
    )
    .bind(entry.op)
    .bind(&entry.ns)
    .bind(&entry.ui)
    .bind(&entry.destined_recipient)
    .bind(&entry.o)
    .bind(&entry.o2)
    .fetch_optional(conn)
    .await?;

    Ok(existing.map(|(ts,)| ts))
}

async fn insert(conn: &mut SqliteConnection, entry: &EncodedEntry) -> Result<i64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO oplog (op, ns, ui, destined_recipient, o, o2, wall_time)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.op)
    .bind(&entry.ns)
    .bind(&entry.ui)
    .bind(&entry.destined_recipient)
    .bind(&entry.o)
    .bind(&entry.o2)
    .bind(Utc::now().timestamp_millis())
    .execute(conn)
    .await?;

    Ok(result.last_insert_rowid())
}
