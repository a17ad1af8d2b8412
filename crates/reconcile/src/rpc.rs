use async_trait::async_trait;
use kb_core::KbError;
use kb_registry::{RegistryEntry, RegistryKind};
use sqlx::PgPool;

use crate::report::ReconcileReport;
use crate::satellite::{DepthReconciler, SatelliteReconciler};

/// How long a slot may sit in `processing` before it's considered
/// abandoned by a crashed worker and recycled back to `empty`.
const STALE_PROCESSING_THRESHOLD_MINUTES: i64 = 5;

/// RPC server inbox reconciler: depth-managed like job/stream, plus a
/// crash-recovery sweep that recycles slots stuck in `processing` past
/// the staleness threshold back to `empty` so a dead worker can't starve
/// a server path's queue indefinitely.
pub struct RpcServerReconciler {
    inner: DepthReconciler,
}

impl RpcServerReconciler {
    pub fn new() -> Self {
        Self {
            inner: DepthReconciler {
                kind: RegistryKind::RpcServer,
                table: "rpc_server_table.rpc_server_table",
                path_column: "server_path",
                age_column: "request_timestamp",
                insert_blank_row:
                    "INSERT INTO rpc_server_table.rpc_server_table (server_path) VALUES ($1::ltree)",
            },
        }
    }
}

impl Default for RpcServerReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SatelliteReconciler for RpcServerReconciler {
    fn kind(&self) -> RegistryKind {
        RegistryKind::RpcServer
    }

    async fn reconcile(
        &self,
        pool: &PgPool,
        declared: &[RegistryEntry],
    ) -> Result<ReconcileReport, KbError> {
        let mut report = self.inner.reconcile(pool, declared).await?;

        let recycled = sqlx::query(
            "UPDATE rpc_server_table.rpc_server_table
             SET state = 'empty',
                 transaction_tag = '',
                 request_payload = '{}',
                 processing_timestamp = NULL,
                 completed_timestamp = NULL
             WHERE state = 'processing'
               AND processing_timestamp < NOW() - ($1 || ' minutes')::interval",
        )
        .bind(STALE_PROCESSING_THRESHOLD_MINUTES.to_string())
        .execute(pool)
        .await?;

        report.rows_reset = recycled.rows_affected();
        Ok(report)
    }
}

/// RPC client reply inbox reconciler: a reply slot's `server_path` is
/// unknown until a request actually claims it, so blank rows park
/// `server_path` at the same value as `client_path` until then.
pub struct RpcClientReconciler {
    inner: DepthReconciler,
}

impl RpcClientReconciler {
    pub fn new() -> Self {
        Self {
            inner: DepthReconciler {
                kind: RegistryKind::RpcClient,
                table: "rpc_client_table.rpc_client_table",
                path_column: "client_path",
                age_column: "response_timestamp",
                insert_blank_row: "INSERT INTO rpc_client_table.rpc_client_table \
                    (client_path, server_path) VALUES ($1::ltree, $1::ltree)",
            },
        }
    }
}

impl Default for RpcClientReconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SatelliteReconciler for RpcClientReconciler {
    fn kind(&self) -> RegistryKind {
        RegistryKind::RpcClient
    }

    async fn reconcile(
        &self,
        pool: &PgPool,
        declared: &[RegistryEntry],
    ) -> Result<ReconcileReport, KbError> {
        self.inner.reconcile(pool, declared).await
    }
}
