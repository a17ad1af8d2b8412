use chrono::{DateTime, Utc};
use kb_core::KbError;
use serde_json::Value;
use sqlx::{postgres::PgRow, Row};

/// One row of `stream_table.stream_table`.
#[derive(Debug, Clone)]
pub struct StreamRecord {
    pub id: i32,
    pub path: String,
    pub recorded_at: DateTime<Utc>,
    pub data: Value,
}

impl StreamRecord {
    pub(crate) fn from_row(row: &PgRow) -> Result<Self, KbError> {
        Ok(StreamRecord {
            id: row.try_get("id")?,
            path: row.try_get::<String, _>("path")?,
            recorded_at: row.try_get("recorded_at")?,
            data: row.try_get("data")?,
        })
    }
}
