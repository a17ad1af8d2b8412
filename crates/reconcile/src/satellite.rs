use async_trait::async_trait;
use kb_core::{KbError, KbPath};
use kb_registry::{RegistryEntry, RegistryKind};
use sqlx::{PgPool, Row};

use crate::report::ReconcileReport;

const DELETE_CHUNK_SIZE: usize = 500;

#[async_trait]
pub trait SatelliteReconciler: Send + Sync {
    fn kind(&self) -> RegistryKind;

    /// Bring this satellite's table in line with the registry entries of
    /// this reconciler's kind. `declared` has already been filtered to
    /// that kind by the caller.
    async fn reconcile(
        &self,
        pool: &PgPool,
        declared: &[RegistryEntry],
    ) -> Result<ReconcileReport, KbError>;
}

/// Paths present in `table`'s distinct `path_column` values but absent from
/// `declared`, and vice versa.
async fn diff_paths(
    pool: &PgPool,
    table: &str,
    path_column: &str,
    declared: &[KbPath],
) -> Result<(Vec<String>, Vec<String>), KbError> {
    let query = format!("SELECT DISTINCT {path_column}::text AS path FROM {table}");
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    let existing: Vec<String> = rows
        .iter()
        .map(|r| r.try_get::<String, _>("path"))
        .collect::<Result<_, _>>()?;

    let declared_strs: Vec<String> = declared.iter().map(|p| p.to_string()).collect();
    let invalid: Vec<String> = existing
        .iter()
        .filter(|p| !declared_strs.contains(p))
        .cloned()
        .collect();
    let missing: Vec<String> = declared_strs
        .iter()
        .filter(|p| !existing.contains(p))
        .cloned()
        .collect();
    Ok((invalid, missing))
}

async fn delete_paths_chunked(
    pool: &PgPool,
    table: &str,
    path_column: &str,
    paths: &[String],
) -> Result<(), KbError> {
    for chunk in paths.chunks(DELETE_CHUNK_SIZE) {
        let query = format!("DELETE FROM {table} WHERE {path_column}::text = ANY($1)");
        sqlx::query(&query).bind(chunk).execute(pool).await?;
    }
    Ok(())
}

/// One row per declared path, no queue depth: `status_table`. Grounded on
/// `Construct_Status_Table.check_installation` — a pure path-set diff.
pub struct StatusReconciler;

#[async_trait]
impl SatelliteReconciler for StatusReconciler {
    fn kind(&self) -> RegistryKind {
        RegistryKind::Status
    }

    async fn reconcile(
        &self,
        pool: &PgPool,
        declared: &[RegistryEntry],
    ) -> Result<ReconcileReport, KbError> {
        let paths: Vec<KbPath> = declared.iter().map(|e| e.path.clone()).collect();
        let (invalid, missing) =
            diff_paths(pool, "status_table.status_table", "path", &paths).await?;

        delete_paths_chunked(pool, "status_table.status_table", "path", &invalid).await?;

        for path in &missing {
            sqlx::query(
                "INSERT INTO status_table.status_table (path, data) VALUES ($1::ltree, '{}')",
            )
            .bind(path)
            .execute(pool)
            .await?;
        }

        Ok(ReconcileReport {
            paths_created: missing.len() as u64,
            paths_deleted: invalid.len() as u64,
            ..Default::default()
        })
    }
}

/// Depth-managed satellite: one row per queued item, row count per path
/// kept equal to that path's declared `queue_depth`. Shared by job and
/// stream tables — both manage a bounded FIFO of rows per path and differ
/// only in table/column names and the blank-row shape, grounded on
/// `Construct_job_Table`/`Construct_Stream_Table`'s near-identical
/// `_manage_*_table`.
pub struct DepthReconciler {
    pub kind: RegistryKind,
    pub table: &'static str,
    pub path_column: &'static str,
    /// Column to order by when trimming surplus rows, oldest first.
    pub age_column: &'static str,
    /// INSERT statement for one blank row; must take exactly one bind
    /// parameter, the path (already cast to ltree inside the statement).
    pub insert_blank_row: &'static str,
}

#[async_trait]
impl SatelliteReconciler for DepthReconciler {
    fn kind(&self) -> RegistryKind {
        self.kind
    }

    async fn reconcile(
        &self,
        pool: &PgPool,
        declared: &[RegistryEntry],
    ) -> Result<ReconcileReport, KbError> {
        let paths: Vec<KbPath> = declared.iter().map(|e| e.path.clone()).collect();
        let (invalid, missing) = diff_paths(pool, self.table, self.path_column, &paths).await?;
        delete_paths_chunked(pool, self.table, self.path_column, &invalid).await?;

        let mut rows_added = 0u64;
        let mut rows_removed = 0u64;

        for entry in declared {
            let target = entry.queue_depth()?;
            let path = entry.path.to_string();

            let count_query =
                format!("SELECT COUNT(*) AS n FROM {} WHERE {}::text = $1", self.table, self.path_column);
            let current: i64 = sqlx::query(&count_query)
                .bind(&path)
                .fetch_one(pool)
                .await?
                .try_get("n")?;

            let diff = target - current;
            if diff > 0 {
                for _ in 0..diff {
                    sqlx::query(self.insert_blank_row)
                        .bind(&path)
                        .execute(pool)
                        .await?;
                }
                rows_added += diff as u64;
            } else if diff < 0 {
                let surplus = (-diff) as i64;
                let delete_query = format!(
                    "DELETE FROM {table} WHERE id IN (
                        SELECT id FROM {table} WHERE {path_col}::text = $1
                        ORDER BY {age_col} ASC LIMIT $2
                    )",
                    table = self.table,
                    path_col = self.path_column,
                    age_col = self.age_column,
                );
                sqlx::query(&delete_query)
                    .bind(&path)
                    .bind(surplus)
                    .execute(pool)
                    .await?;
                rows_removed += surplus as u64;
            }
        }

        Ok(ReconcileReport {
            paths_created: missing.len() as u64,
            paths_deleted: invalid.len() as u64,
            rows_added,
            rows_removed,
        })
    }
}
