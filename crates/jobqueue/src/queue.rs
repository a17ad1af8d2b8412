use chrono::{DateTime, Utc};
use kb_core::{retry::RetryPolicy, with_backoff, KbError, KbPath};
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::record::{ClaimedJob, JobRecord};

/// Retry/backoff parameters for lock-contended operations, set once at
/// construction rather than threaded through every call — the teacher's
/// config-struct-at-startup convention (`kb_core::config::Config`)
/// generalized to a per-queue policy.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub retry_policy: RetryPolicy,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
        }
    }
}

pub struct JobQueue {
    pool: PgPool,
    config: JobQueueConfig,
}

impl JobQueue {
    pub fn new(pool: PgPool, config: JobQueueConfig) -> Self {
        Self { pool, config }
    }

    /// Number of slots at `path` currently holding unconsumed work
    /// (`valid = TRUE`), whether or not a worker has claimed them yet.
    pub async fn count_pending(&self, path: &KbPath) -> Result<i64, KbError> {
        let n: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM job_table.job_table WHERE path = $1::ltree AND valid = TRUE AND is_active = FALSE",
        )
        .bind(path.to_string())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        Ok(n)
    }

    /// Number of free slots at `path` available to accept new work.
    pub async fn count_free(&self, path: &KbPath) -> Result<i64, KbError> {
        let n: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM job_table.job_table WHERE path = $1::ltree AND valid = FALSE",
        )
        .bind(path.to_string())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        Ok(n)
    }

    /// Claim the oldest free slot at `path` and fill it with `data`,
    /// marking it queued (`valid = TRUE`, `is_active = FALSE`). Returns
    /// the claimed row's id. Errors with `QueueFull` if no free slot
    /// exists for this path.
    pub async fn push(&self, path: &KbPath, data: Value) -> Result<i32, KbError> {
        let path_str = path.to_string();
        let data = data.clone();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let path_str = path_str.clone();
            let data = data.clone();
            async move {
                let mut tx = pool.begin().await?;
                let row = sqlx::query(
                    "SELECT id FROM job_table.job_table
                     WHERE path = $1::ltree AND valid = FALSE
                     ORDER BY completed_at ASC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED",
                )
                .bind(&path_str)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    return Err(KbError::QueueFull);
                };
                let id: i32 = row.try_get("id")?;

                sqlx::query(
                    "UPDATE job_table.job_table
                     SET data = $1, schedule_at = NOW(), started_at = NOW(),
                         completed_at = NOW(), valid = TRUE, is_active = FALSE
                     WHERE id = $2",
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

    /// Claim the oldest queued-but-not-active slot at `path`, marking it
    /// active. Returns `None` if nothing is waiting.
    pub async fn claim(&self, path: &KbPath) -> Result<Option<ClaimedJob>, KbError> {
        let path_str = path.to_string();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let path_str = path_str.clone();
            async move {
                let mut tx = pool.begin().await?;
                let row = sqlx::query(
                    "SELECT id, data, schedule_at FROM job_table.job_table
                     WHERE path = $1::ltree AND valid = TRUE AND is_active = FALSE
                     ORDER BY schedule_at ASC
                     FOR UPDATE SKIP LOCKED
                     LIMIT 1",
                )
                .bind(&path_str)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    tx.rollback().await?;
                    return Ok(None);
                };

                let id: i32 = row.try_get("id")?;
                let data: Value = row.try_get("data")?;
                let schedule_at: DateTime<Utc> = row.try_get("schedule_at")?;

                sqlx::query(
                    "UPDATE job_table.job_table SET started_at = NOW(), is_active = TRUE WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(Some(ClaimedJob { id, data, schedule_at }))
            }
        })
        .await
    }

    /// Mark a claimed job completed: frees the slot (`valid = FALSE`,
    /// `is_active = FALSE`) so a future `push` may reuse it.
    pub async fn complete(&self, id: i32) -> Result<(), KbError> {
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            async move {
                let mut tx = pool.begin().await?;
                let row = sqlx::query("SELECT id FROM job_table.job_table WHERE id = $1 FOR UPDATE NOWAIT")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;

                if row.is_none() {
                    tx.rollback().await?;
                    return Err(KbError::NoMatchingRecord);
                }

                sqlx::query(
                    "UPDATE job_table.job_table SET completed_at = NOW(), valid = FALSE, is_active = FALSE WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(())
            }
        })
        .await
    }

    pub async fn list_pending(&self, path: &KbPath, limit: Option<i64>, offset: i64) -> Result<Vec<JobRecord>, KbError> {
        let rows = sqlx::query(
            "SELECT id, path::text AS path, schedule_at, started_at, completed_at, is_active, valid, data
             FROM job_table.job_table
             WHERE path = $1::ltree AND valid = TRUE AND is_active = FALSE
             ORDER BY schedule_at ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(path.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(JobRecord::from_row).collect()
    }

    pub async fn list_active(&self, path: &KbPath, limit: Option<i64>, offset: i64) -> Result<Vec<JobRecord>, KbError> {
        let rows = sqlx::query(
            "SELECT id, path::text AS path, schedule_at, started_at, completed_at, is_active, valid, data
             FROM job_table.job_table
             WHERE path = $1::ltree AND valid = TRUE AND is_active = TRUE
             ORDER BY started_at ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(path.to_string())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(JobRecord::from_row).collect()
    }

    pub async fn list_completed(
        &self,
        path: &KbPath,
        limit: Option<i64>,
        offset: i64,
        completed_after: Option<DateTime<Utc>>,
        completed_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<JobRecord>, KbError> {
        let rows = sqlx::query(
            "SELECT id, path::text AS path, schedule_at, started_at, completed_at, is_active, valid, data
             FROM job_table.job_table
             WHERE path = $1::ltree AND valid = FALSE AND is_active = FALSE
               AND ($2::timestamptz IS NULL OR completed_at >= $2)
               AND ($3::timestamptz IS NULL OR completed_at <= $3)
             ORDER BY completed_at ASC
             LIMIT $4 OFFSET $5",
        )
        .bind(path.to_string())
        .bind(completed_after)
        .bind(completed_before)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(JobRecord::from_row).collect()
    }

    /// Reset every slot at `path` back to free, discarding whatever work
    /// was queued or in flight. Takes an exclusive table lock for the
    /// duration, matching the original's blunt but simple approach —
    /// acceptable because this is an operator action, not steady-state
    /// traffic.
    pub async fn clear(&self, path: &KbPath) -> Result<u64, KbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("LOCK TABLE job_table.job_table IN EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query(
            "UPDATE job_table.job_table
             SET schedule_at = NOW(), started_at = NOW(), completed_at = NOW(),
                 is_active = FALSE, valid = FALSE, data = '{}'
             WHERE path = $1::ltree",
        )
        .bind(path.to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
