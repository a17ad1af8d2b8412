use chrono::{DateTime, Utc};
use kb_core::{retry::RetryPolicy, with_backoff, KbError, KbPath};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::record::StreamRecord;

/// Retry/backoff parameters for `push`'s skip-locked slot pick, set once
/// at construction — same per-queue-policy convention as
/// `kb_jobqueue::JobQueueConfig`.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub retry_policy: RetryPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// A fixed-depth ring buffer of timestamped samples per path. Unlike the
/// job queue's valid/free distinction, every row always holds a sample —
/// `push` always wins by overwriting the oldest one, never fails with
/// "queue full". Grounded on
/// `original_source/kb_python/data_structures/kb_stream.py`.
pub struct Stream {
    pool: PgPool,
    config: StreamConfig,
}

impl Stream {
    pub fn new(pool: PgPool) -> Self {
        Self::with_config(pool, StreamConfig::default())
    }

    pub fn with_config(pool: PgPool, config: StreamConfig) -> Self {
        Self { pool, config }
    }

    /// Overwrite the oldest sample at `path` with `data`. Errors with
    /// `NoSlotAvailable` if no rows exist for this path (queue depth zero
    /// or path never reconciled).
    pub async fn push(&self, path: &KbPath, data: Value) -> Result<i32, KbError> {
        let path_str = path.to_string();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let path_str = path_str.clone();
            let data = data.clone();
            async move {
                let mut tx = pool.begin().await?;
                let row = sqlx::query(
                    "SELECT id FROM stream_table.stream_table
                     WHERE path = $1::ltree
                     ORDER BY recorded_at ASC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED",
                )
                .bind(&path_str)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    tx.rollback().await?;
                    return Err(KbError::NoSlotAvailable);
                };
                let id: i32 = row.try_get("id")?;

                sqlx::query(
                    "UPDATE stream_table.stream_table SET data = $1, recorded_at = NOW() WHERE id = $2",
                )
                .bind(&data)
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(id)
            }
        })
        .await
    }

    pub async fn list(
        &self,
        path: &KbPath,
        limit: Option<i64>,
        offset: i64,
        recorded_after: Option<DateTime<Utc>>,
        recorded_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<StreamRecord>, KbError> {
        let rows = sqlx::query(
            "SELECT id, path::text AS path, recorded_at, data
             FROM stream_table.stream_table
             WHERE path = $1::ltree
               AND ($2::timestamptz IS NULL OR recorded_at >= $2)
               AND ($3::timestamptz IS NULL OR recorded_at <= $3)
             ORDER BY recorded_at ASC
             LIMIT $4 OFFSET $5",
        )
        .bind(path.to_string())
        .bind(recorded_after)
        .bind(recorded_before)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(StreamRecord::from_row).collect()
    }
}
