use chrono::{DateTime, Utc};
use kb_core::KbError;
use serde_json::Value;
use sqlx::{postgres::PgRow, Row};

/// One row of `job_table.job_table`.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: i32,
    pub path: String,
    pub schedule_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub is_active: bool,
    pub valid: bool,
    pub data: Value,
}

impl JobRecord {
    pub(crate) fn from_row(row: &PgRow) -> Result<Self, KbError> {
        Ok(JobRecord {
            id: row.try_get("id")?,
            path: row.try_get::<String, _>("path")?,
            schedule_at: row.try_get("schedule_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            is_active: row.try_get("is_active")?,
            valid: row.try_get("valid")?,
            data: row.try_get("data")?,
        })
    }
}

/// The subset of a job's identity handed back by [`crate::JobQueue::claim`]
/// — just enough for a worker to process it and report completion by id.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: i32,
    pub data: Value,
    pub schedule_at: DateTime<Utc>,
}
