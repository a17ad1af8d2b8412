use kb_core::{retry::RetryPolicy, with_backoff, KbError, KbPath};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::lock::advisory_lock_key;
use crate::record::{AdmittedRequest, ClaimedRequest, RpcServerRow};
use crate::state::RpcServerState;

#[derive(Debug, Clone)]
pub struct RpcServerInboxConfig {
    pub retry_policy: RetryPolicy,
}

impl Default for RpcServerInboxConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::exponential(
                5,
                std::time::Duration::from_millis(500),
                std::time::Duration::from_secs(8),
            ),
        }
    }
}

/// A server's inbox of admitted RPC requests: a bounded ring of slots
/// cycling `empty -> new_job -> processing -> empty`. Grounded on
/// `original_source/kb_python_postgres/kb_ref/data_structures/kb_rpc_server.py`.
pub struct RpcServerInbox {
    pool: PgPool,
    config: RpcServerInboxConfig,
}

impl RpcServerInbox {
    pub fn new(pool: PgPool, config: RpcServerInboxConfig) -> Self {
        Self { pool, config }
    }

    /// Admit one request into the first empty slot at `server_path`,
    /// highest priority first, oldest slot first. Takes a per-path
    /// advisory lock for the duration of the transaction so concurrent
    /// admissions never race for the same slot. Errors `NoSlotAvailable`
    /// if no empty slot exists.
    #[allow(clippy::too_many_arguments)]
    pub async fn push(
        &self,
        server_path: &KbPath,
        request_id: Option<Uuid>,
        rpc_action: &str,
        request_payload: Value,
        transaction_tag: &str,
        priority: i32,
        rpc_client_queue: Option<&KbPath>,
    ) -> Result<AdmittedRequest, KbError> {
        if rpc_action.is_empty() {
            return Err(KbError::Validation("rpc_action must be a non-empty string".into()));
        }
        if transaction_tag.is_empty() {
            return Err(KbError::Validation("transaction_tag must be a non-empty string".into()));
        }

        let server_path_str = server_path.to_string();
        let request_id = request_id.unwrap_or_else(Uuid::new_v4);
        let client_queue_str = rpc_client_queue.map(|p| p.to_string());
        let lock_key = advisory_lock_key(&server_path_str);

        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let server_path_str = server_path_str.clone();
            let client_queue_str = client_queue_str.clone();
            let request_payload = request_payload.clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("SELECT pg_advisory_xact_lock($1)")
                    .bind(lock_key)
                    .execute(&mut *tx)
                    .await?;

                let row = sqlx::query(
                    "SELECT id FROM rpc_server_table.rpc_server_table
                     WHERE server_path = $1::ltree AND state = 'empty'
                     ORDER BY priority DESC, request_timestamp ASC
                     LIMIT 1
                     FOR UPDATE",
                )
                .bind(&server_path_str)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    tx.rollback().await?;
                    return Err(KbError::NoSlotAvailable);
                };
                let id: i32 = row.try_get("id")?;

                sqlx::query(
                    "UPDATE rpc_server_table.rpc_server_table
                     SET request_id = $1, rpc_action = $2, request_payload = $3,
                         transaction_tag = $4, priority = $5, rpc_client_queue = $6::ltree,
                         state = 'new_job', request_timestamp = NOW(), completed_timestamp = NULL
                     WHERE id = $7",
                )
                .bind(request_id)
                .bind(rpc_action)
                .bind(&request_payload)
                .bind(transaction_tag)
                .bind(priority)
                .bind(&client_queue_str)
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(AdmittedRequest { id, request_id })
            }
        })
        .await
    }

    /// Claim the highest-priority, oldest `new_job` slot at `server_path`
    /// and mark it `processing`. Returns `None` if nothing is waiting.
    pub async fn peek(&self, server_path: &KbPath) -> Result<Option<ClaimedRequest>, KbError> {
        let server_path_str = server_path.to_string();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let server_path_str = server_path_str.clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                    .execute(&mut *tx)
                    .await?;

                let row = sqlx::query(
                    "SELECT id, request_id, rpc_action, request_payload, transaction_tag,
                            priority, rpc_client_queue::text AS rpc_client_queue
                     FROM rpc_server_table.rpc_server_table
                     WHERE server_path = $1::ltree AND state = 'new_job'
                     ORDER BY priority DESC, request_timestamp ASC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED",
                )
                .bind(&server_path_str)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    tx.rollback().await?;
                    return Ok(None);
                };

                let id: i32 = row.try_get("id")?;
                let claimed = ClaimedRequest {
                    id,
                    request_id: row.try_get("request_id")?,
                    rpc_action: row.try_get("rpc_action")?,
                    request_payload: row.try_get("request_payload")?,
                    transaction_tag: row.try_get("transaction_tag")?,
                    priority: row.try_get("priority")?,
                    rpc_client_queue: row.try_get("rpc_client_queue")?,
                };

                sqlx::query(
                    "UPDATE rpc_server_table.rpc_server_table
                     SET state = 'processing', processing_timestamp = NOW()
                     WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(Some(claimed))
            }
        })
        .await
    }

    /// Mark a `processing` slot completed, freeing it back to `empty`.
    /// Errors `NoMatchingRecord` if `id` isn't currently `processing` at
    /// `server_path`.
    pub async fn complete(&self, server_path: &KbPath, id: i32) -> Result<(), KbError> {
        let server_path_str = server_path.to_string();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let server_path_str = server_path_str.clone();
            async move {
                let mut tx = pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                    .execute(&mut *tx)
                    .await?;

                let row = sqlx::query(
                    "SELECT id FROM rpc_server_table.rpc_server_table
                     WHERE id = $1 AND server_path = $2::ltree AND state = 'processing'
                     FOR UPDATE",
                )
                .bind(id)
                .bind(&server_path_str)
                .fetch_optional(&mut *tx)
                .await?;

                if row.is_none() {
                    tx.rollback().await?;
                    return Err(KbError::NoMatchingRecord);
                }

                sqlx::query(
                    "UPDATE rpc_server_table.rpc_server_table
                     SET state = 'empty', completed_timestamp = NOW()
                     WHERE id = $1",
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

    pub async fn count_by_state(&self, server_path: &KbPath, state: RpcServerState) -> Result<i64, KbError> {
        let n: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM rpc_server_table.rpc_server_table
             WHERE server_path = $1::ltree AND state = $2",
        )
        .bind(server_path.to_string())
        .bind(state.to_string())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        Ok(n)
    }

    pub async fn list_by_state(
        &self,
        server_path: &KbPath,
        state: RpcServerState,
    ) -> Result<Vec<RpcServerRow>, KbError> {
        let rows = sqlx::query(
            "SELECT id, server_path::text AS server_path, request_id, rpc_action, request_payload,
                    request_timestamp, transaction_tag, state, priority, processing_timestamp,
                    completed_timestamp, rpc_client_queue::text AS rpc_client_queue
             FROM rpc_server_table.rpc_server_table
             WHERE server_path = $1::ltree AND state = $2
             ORDER BY priority DESC, request_timestamp ASC",
        )
        .bind(server_path.to_string())
        .bind(state.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(RpcServerRow::from_row).collect()
    }

    /// Reset every slot at `server_path` back to `empty`, discarding
    /// in-flight work. Takes row locks up front (`NOWAIT`) so a caller
    /// gets an immediate `RetryExhausted`-free failure rather than
    /// blocking behind active workers.
    pub async fn clear(&self, server_path: &KbPath) -> Result<u64, KbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "SELECT 1 FROM rpc_server_table.rpc_server_table WHERE server_path = $1::ltree FOR UPDATE NOWAIT",
        )
        .bind(server_path.to_string())
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE rpc_server_table.rpc_server_table
             SET request_id = gen_random_uuid(), request_payload = '{}',
                 completed_timestamp = NOW(), state = 'empty', rpc_client_queue = NULL,
                 transaction_tag = ''
             WHERE server_path = $1::ltree",
        )
        .bind(server_path.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
