use kb_core::{retry::RetryPolicy, with_backoff, KbError, KbPath};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::record::{PendingReply, PushedReply, RpcClientRow};

#[derive(Debug, Clone)]
pub struct RpcClientInboxConfig {
    pub retry_policy: RetryPolicy,
}

impl Default for RpcClientInboxConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::exponential(
                3,
                std::time::Duration::from_millis(500),
                std::time::Duration::from_secs(4),
            ),
        }
    }
}

/// A client's mailbox of pending replies: a bounded ring of slots cycling
/// `FREE (is_new_result=false) -> QUEUED (is_new_result=true) -> FREE`.
/// Grounded on `original_source/kb_python/data_structures/kb_rpc_client.py`.
pub struct RpcClientInbox {
    pool: PgPool,
    config: RpcClientInboxConfig,
}

impl RpcClientInbox {
    pub fn new(pool: PgPool, config: RpcClientInboxConfig) -> Self {
        Self { pool, config }
    }

    async fn total_rows(&self, client_path: &KbPath) -> Result<i64, KbError> {
        let n: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM rpc_client_table.rpc_client_table WHERE client_path = $1::ltree",
        )
        .bind(client_path.to_string())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        Ok(n)
    }

    /// Number of `FREE` slots at `client_path`. Errors `NoMatchingRecord` if
    /// the path has never been reconciled (zero rows at all).
    pub async fn count_free(&self, client_path: &KbPath) -> Result<i64, KbError> {
        if self.total_rows(client_path).await? == 0 {
            return Err(KbError::NoMatchingRecord);
        }
        let n: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM rpc_client_table.rpc_client_table
             WHERE client_path = $1::ltree AND is_new_result = FALSE",
        )
        .bind(client_path.to_string())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        Ok(n)
    }

    /// Number of `QUEUED` slots at `client_path`. Errors `NoMatchingRecord`
    /// if the path has never been reconciled.
    pub async fn count_queued(&self, client_path: &KbPath) -> Result<i64, KbError> {
        if self.total_rows(client_path).await? == 0 {
            return Err(KbError::NoMatchingRecord);
        }
        let n: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM rpc_client_table.rpc_client_table
             WHERE client_path = $1::ltree AND is_new_result = TRUE",
        )
        .bind(client_path.to_string())
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;
        Ok(n)
    }

    /// Claim the oldest `FREE` slot at `client_path` and fill it with a
    /// reply, transitioning it to `QUEUED`. Errors `ReplyInboxFull` if no
    /// free slot exists.
    pub async fn push_reply(
        &self,
        client_path: &KbPath,
        request_id: Option<Uuid>,
        server_path: &KbPath,
        rpc_action: &str,
        reply_data: Value,
    ) -> Result<PushedReply, KbError> {
        let client_path_str = client_path.to_string();
        let server_path_str = server_path.to_string();
        let request_id = request_id.unwrap_or_else(Uuid::new_v4);

        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let client_path_str = client_path_str.clone();
            let server_path_str = server_path_str.clone();
            let reply_data = reply_data.clone();
            async move {
                let mut tx = pool.begin().await?;

                let row = sqlx::query(
                    "SELECT id FROM rpc_client_table.rpc_client_table
                     WHERE client_path = $1::ltree AND is_new_result = FALSE
                     ORDER BY response_timestamp ASC
                     LIMIT 1
                     FOR UPDATE SKIP LOCKED",
                )
                .bind(&client_path_str)
                .fetch_optional(&mut *tx)
                .await?;

                let Some(row) = row else {
                    tx.rollback().await?;
                    return Err(KbError::ReplyInboxFull);
                };
                let id: i32 = row.try_get("id")?;

                sqlx::query(
                    "UPDATE rpc_client_table.rpc_client_table
                     SET request_id = $1, server_path = $2::ltree, rpc_action = $3,
                         response_payload = $4, is_new_result = TRUE, response_timestamp = NOW()
                     WHERE id = $5",
                )
                .bind(request_id)
                .bind(&server_path_str)
                .bind(rpc_action)
                .bind(&reply_data)
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(PushedReply { id, request_id })
            }
        })
        .await
    }

    /// Read-only look at the earliest `QUEUED` reply at `client_path`,
    /// without consuming it. Callers must follow up with [`Self::release`]
    /// once the reply has been handled.
    pub async fn peek_reply(&self, client_path: &KbPath) -> Result<Option<PendingReply>, KbError> {
        if self.total_rows(client_path).await? == 0 {
            return Err(KbError::NoMatchingRecord);
        }

        let row = sqlx::query(
            "SELECT id, request_id, server_path::text AS server_path, rpc_action, response_payload
             FROM rpc_client_table.rpc_client_table
             WHERE client_path = $1::ltree AND is_new_result = TRUE
             ORDER BY response_timestamp ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(client_path.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(PendingReply {
            id: row.try_get("id")?,
            request_id: row.try_get("request_id")?,
            server_path: row.try_get("server_path")?,
            rpc_action: row.try_get("rpc_action")?,
            response_payload: row.try_get("response_payload")?,
        }))
    }

    /// Release a `QUEUED` slot back to `FREE` once its reply has been
    /// consumed. Returns `false` if `id` wasn't `QUEUED` at `client_path`.
    pub async fn release(&self, client_path: &KbPath, id: i32) -> Result<bool, KbError> {
        let client_path_str = client_path.to_string();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let client_path_str = client_path_str.clone();
            async move {
                let mut tx = pool.begin().await?;

                let row = sqlx::query(
                    "SELECT id FROM rpc_client_table.rpc_client_table
                     WHERE id = $1 AND client_path = $2::ltree AND is_new_result = TRUE
                     FOR UPDATE NOWAIT",
                )
                .bind(id)
                .bind(&client_path_str)
                .fetch_optional(&mut *tx)
                .await?;

                if row.is_none() {
                    tx.commit().await?;
                    return Ok(false);
                }

                sqlx::query(
                    "UPDATE rpc_client_table.rpc_client_table SET is_new_result = FALSE WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(true)
            }
        })
        .await
    }

    /// Reset every slot at `client_path` back to `FREE`, discarding any
    /// queued replies. Returns the number of rows reset.
    pub async fn clear(&self, client_path: &KbPath) -> Result<u64, KbError> {
        let client_path_str = client_path.to_string();
        with_backoff(&self.config.retry_policy, || {
            let pool = self.pool.clone();
            let client_path_str = client_path_str.clone();
            async move {
                let mut tx = pool.begin().await?;

                let ids: Vec<i32> = sqlx::query(
                    "SELECT id FROM rpc_client_table.rpc_client_table
                     WHERE client_path = $1::ltree FOR UPDATE NOWAIT",
                )
                .bind(&client_path_str)
                .fetch_all(&mut *tx)
                .await?
                .iter()
                .map(|row| row.try_get("id"))
                .collect::<Result<_, _>>()?;

                if ids.is_empty() {
                    tx.commit().await?;
                    return Ok(0);
                }

                let result = sqlx::query(
                    "UPDATE rpc_client_table.rpc_client_table
                     SET request_id = gen_random_uuid(), server_path = client_path,
                         response_payload = '{}', response_timestamp = NOW(), is_new_result = FALSE
                     WHERE client_path = $1::ltree",
                )
                .bind(&client_path_str)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok(result.rows_affected())
            }
        })
        .await
    }

    /// All `QUEUED` replies across every client path, oldest first, or
    /// scoped to one `client_path` if given.
    pub async fn list_waiting(&self, client_path: Option<&KbPath>) -> Result<Vec<RpcClientRow>, KbError> {
        let rows = match client_path {
            Some(path) => {
                sqlx::query(
                    "SELECT id, request_id, client_path::text AS client_path,
                            server_path::text AS server_path, rpc_action, response_payload,
                            response_timestamp, is_new_result
                     FROM rpc_client_table.rpc_client_table
                     WHERE is_new_result = TRUE AND client_path = $1::ltree
                     ORDER BY response_timestamp ASC",
                )
                .bind(path.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, request_id, client_path::text AS client_path,
                            server_path::text AS server_path, rpc_action, response_payload,
                            response_timestamp, is_new_result
                     FROM rpc_client_table.rpc_client_table
                     WHERE is_new_result = TRUE
                     ORDER BY response_timestamp ASC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter().map(RpcClientRow::from_row).collect()
    }
}
