use kb_core::KbError;
use kb_registry::RegistryKind;
use sqlx::PgPool;
use tracing::info;

use crate::report::KindedReport;
use crate::rpc::{RpcClientReconciler, RpcServerReconciler};
use crate::satellite::{DepthReconciler, SatelliteReconciler};

/// Runs every satellite's reconciliation against the registry, always in
/// the same fixed order (status, job, stream, rpc-server, rpc-client) so
/// logs and reports are stable across runs.
pub struct Reconciler {
    satellites: Vec<Box<dyn SatelliteReconciler>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            satellites: vec![
                Box::new(crate::satellite::StatusReconciler),
                Box::new(DepthReconciler {
                    kind: RegistryKind::Job,
                    table: "job_table.job_table",
                    path_column: "path",
                    age_column: "completed_at",
                    insert_blank_row: "INSERT INTO job_table.job_table (path) VALUES ($1::ltree)",
                }),
                Box::new(DepthReconciler {
                    kind: RegistryKind::Stream,
                    table: "stream_table.stream_table",
                    path_column: "path",
                    age_column: "recorded_at",
                    insert_blank_row: "INSERT INTO stream_table.stream_table (path) VALUES ($1::ltree)",
                }),
                Box::new(RpcServerReconciler::new()),
                Box::new(RpcClientReconciler::new()),
            ],
        }
    }

    /// Reconcile every satellite kind in order, returning one report per
    /// kind. Does not short-circuit on a per-satellite error — each
    /// satellite's registry read and table sync is independent, so one
    /// satellite's store error shouldn't block reconciling the rest; the
    /// first error is surfaced to the caller after all have run.
    pub async fn reconcile_all(&self, pool: &PgPool) -> Result<Vec<KindedReport>, KbError> {
        let mut reports = Vec::with_capacity(self.satellites.len());
        let mut first_error = None;

        for satellite in &self.satellites {
            let kind = satellite.kind();
            let declared = match kb_registry::list_by_kind(pool, kind).await {
                Ok(entries) => entries,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            match satellite.reconcile(pool, &declared).await {
                Ok(report) => {
                    info!(
                        %kind,
                        paths_created = report.paths_created,
                        paths_deleted = report.paths_deleted,
                        rows_added = report.rows_added,
                        rows_removed = report.rows_removed,
                        rows_reset = report.rows_reset,
                        "reconciled satellite"
                    );
                    reports.push(KindedReport { kind, report });
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(reports)
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_registry::RegistryBuilder;

    #[tokio::test]
    async fn reconcile_creates_rows_for_declared_queue_depth() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping reconcile_creates_rows_for_declared_queue_depth: no database configured");
            return;
        };

        let mut builder = RegistryBuilder::new(pool.clone());
        builder
            .add_header(
                RegistryKind::Header,
                "reconcile_test_root",
                serde_json::json!({}),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        builder
            .add_info(
                RegistryKind::Job,
                "reconcile_test_queue",
                serde_json::json!({"queue_depth": 3}),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        builder.leave(RegistryKind::Header, "reconcile_test_root").unwrap();
        builder.check_installation().await.unwrap();

        let reconciler = Reconciler::new();
        let reports = reconciler.reconcile_all(&pool).await.unwrap();

        let job_report = reports
            .iter()
            .find(|r| r.kind == RegistryKind::Job)
            .expect("job satellite must run");
        assert_eq!(job_report.report.rows_added, 3);

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_table.job_table WHERE path::text = 'HEADER.reconcile_test_root.KB_JOB_QUEUE.reconcile_test_queue'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 3);
    }
}
