use chrono::{DateTime, Utc};
use kb_core::KbError;
use serde_json::Value;
use sqlx::{postgres::PgRow, Row};
use uuid::Uuid;

/// One row of `rpc_client_table.rpc_client_table`.
#[derive(Debug, Clone)]
pub struct RpcClientRow {
    pub id: i32,
    pub request_id: Uuid,
    pub client_path: String,
    pub server_path: String,
    pub rpc_action: String,
    pub response_payload: Value,
    pub response_timestamp: DateTime<Utc>,
    pub is_new_result: bool,
}

impl RpcClientRow {
    pub(crate) fn from_row(row: &PgRow) -> Result<Self, KbError> {
        Ok(RpcClientRow {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            client_path: row.try_get::<String, _>("client_path")?,
            server_path: row.try_get::<String, _>("server_path")?,
            rpc_action: row.try_get("rpc_action")?,
            response_payload: row.try_get("response_payload")?,
            response_timestamp: row.try_get("response_timestamp")?,
            is_new_result: row.try_get("is_new_result")?,
        })
    }
}

/// A reply admitted by [`crate::inbox::RpcClientInbox::push_reply`].
#[derive(Debug, Clone)]
pub struct PushedReply {
    pub id: i32,
    pub request_id: Uuid,
}

/// A reply claimed by [`crate::inbox::RpcClientInbox::peek_reply`], read-only
/// until released.
#[derive(Debug, Clone)]
pub struct PendingReply {
    pub id: i32,
    pub request_id: Uuid,
    pub server_path: String,
    pub rpc_action: String,
    pub response_payload: Value,
}
