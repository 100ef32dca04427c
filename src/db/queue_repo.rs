//! Durable mutation queue over the `sync_queue` table.
//!
//! Entries are appended when a local write happens while unconfirmed by the
//! server, replayed oldest-first by the sync engine, and deleted only after
//! the server accepts them. Failed entries stay queued with a bumped retry
//! counter and the last error message.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::warn;

use crate::models::{parse_timestamp, QueuePayload};

/// One drained queue row. `payload` is `None` when the stored row no longer
/// decodes into a typed mutation; the engine drops such rows with a warning.
#[derive(Debug)]
pub struct QueueEntry {
    pub id: i64,
    pub table_name: String,
    pub record_id: i64,
    pub retry_count: i64,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub payload: Option<QueuePayload>,
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: i64,
    table_name: String,
    record_id: i64,
    operation: String,
    data: Option<String>,
    created_at: String,
    retry_count: i64,
    last_error: Option<String>,
}

pub struct SyncQueueRepository {
    pool: SqlitePool,
}

impl SyncQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All pending entries, oldest first. Read-only; entries are removed
    /// only by `acknowledge`.
    pub async fn drain(&self) -> Result<Vec<QueueEntry>, sqlx::Error> {
        let rows: Vec<QueueRow> =
            sqlx::query_as("SELECT * FROM sync_queue ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let payload =
                match QueuePayload::decode(&row.table_name, &row.operation, row.data.as_deref()) {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(
                            entry = row.id,
                            table = %row.table_name,
                            operation = %row.operation,
                            error = %e,
                            "queue entry no longer decodes"
                        );
                        None
                    }
                };
            entries.push(QueueEntry {
                id: row.id,
                table_name: row.table_name,
                record_id: row.record_id,
                retry_count: row.retry_count,
                last_error: row.last_error,
                created_at: parse_timestamp(&row.created_at),
                payload,
            });
        }
        Ok(entries)
    }

    /// Remove an entry after the server accepted it.
    pub async fn acknowledge(&self, entry_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sync_queue WHERE id = ?")
            .bind(entry_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a failed replay attempt; the entry stays queued for the next
    /// pass. No retry ceiling is enforced.
    pub async fn mark_failed(&self, entry_id: i64, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sync_queue SET retry_count = retry_count + 1, last_error = ? WHERE id = ?",
        )
        .bind(error)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether other entries still reference the record; used to decide when
    /// the record's `synced` flag may flip to 1.
    pub async fn has_pending_for(
        &self,
        table: &str,
        record_id: i64,
        excluding_entry: i64,
    ) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sync_queue WHERE table_name = ? AND record_id = ? AND id != ?",
        )
        .bind(table)
        .bind(record_id)
        .bind(excluding_entry)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    pub async fn pending_count(&self) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Entries that have failed at least once, for `sync status` output.
    pub async fn failed_entries(&self) -> Result<Vec<QueueEntry>, sqlx::Error> {
        let entries = self.drain().await?;
        Ok(entries.into_iter().filter(|e| e.retry_count > 0).collect())
    }
}

/// Append a queue entry on an existing connection, so document repositories
/// can commit the domain write and the queue append in one transaction.
pub async fn enqueue_with(
    conn: &mut SqliteConnection,
    record_id: i64,
    payload: &QueuePayload,
) -> Result<i64, sqlx::Error> {
    let data = payload
        .encode()
        .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

    let result = sqlx::query(
        r#"
        INSERT INTO sync_queue (table_name, record_id, operation, data, created_at, retry_count)
        VALUES (?, ?, ?, ?, ?, 0)
        "#,
    )
    .bind(payload.table_name())
    .bind(record_id)
    .bind(payload.operation().as_str())
    .bind(&data)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}
