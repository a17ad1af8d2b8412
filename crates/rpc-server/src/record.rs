use chrono::{DateTime, Utc};
use kb_core::KbError;
use serde_json::Value;
use sqlx::{postgres::PgRow, Row};
use uuid::Uuid;

use crate::state::RpcServerState;

/// One row of `rpc_server_table.rpc_server_table`.
#[derive(Debug, Clone)]
pub struct RpcServerRow {
    pub id: i32,
    pub server_path: String,
    pub request_id: Uuid,
    pub rpc_action: String,
    pub request_payload: Value,
    pub request_timestamp: DateTime<Utc>,
    pub transaction_tag: String,
    pub state: RpcServerState,
    pub priority: i32,
    pub processing_timestamp: Option<DateTime<Utc>>,
    pub completed_timestamp: Option<DateTime<Utc>>,
    pub rpc_client_queue: Option<String>,
}

impl RpcServerRow {
    pub(crate) fn from_row(row: &PgRow) -> Result<Self, KbError> {
        let state_str: String = row.try_get("state")?;
        Ok(RpcServerRow {
            id: row.try_get("id")?,
            server_path: row.try_get::<String, _>("server_path")?,
            request_id: row.try_get("request_id")?,
            rpc_action: row.try_get("rpc_action")?,
            request_payload: row.try_get("request_payload")?,
            request_timestamp: row.try_get("request_timestamp")?,
            transaction_tag: row.try_get("transaction_tag")?,
            state: state_str.parse()?,
            priority: row.try_get("priority")?,
            processing_timestamp: row.try_get("processing_timestamp")?,
            completed_timestamp: row.try_get("completed_timestamp")?,
            rpc_client_queue: row.try_get::<Option<String>, _>("rpc_client_queue")?,
        })
    }
}

/// A request admitted by [`crate::inbox::RpcServerInbox::push`].
#[derive(Debug, Clone)]
pub struct AdmittedRequest {
    pub id: i32,
    pub request_id: Uuid,
}

/// A job claimed by [`crate::inbox::RpcServerInbox::peek`], ready for a
/// worker to execute.
#[derive(Debug, Clone)]
pub struct ClaimedRequest {
    pub id: i32,
    pub request_id: Uuid,
    pub rpc_action: String,
    pub request_payload: Value,
    pub transaction_tag: String,
    pub priority: i32,
    pub rpc_client_queue: Option<String>,
}
