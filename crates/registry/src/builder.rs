//! Registry builder: stack-based path assembly for registering headers
//! and leaf endpoints, generalized from a multiple-inheritance
//! `check_installation()` fan-out into a single struct that owns the
//! whole path stack.

use kb_core::{KbError, KbPath};
use serde_json::Value;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::kind::RegistryKind;

/// Builds the registry by walking a tree of path segments. Every
/// `add_header`/`add_info` call writes one row immediately; `leave` only
/// pops the in-process stack, it never touches the store.
pub struct RegistryBuilder {
    pool: PgPool,
    stack: Vec<String>,
    /// Ids written by this builder instance, so `check_installation` can
    /// unwind a failed install by deleting just these rows rather than
    /// dropping the whole registry table — schema lifecycle here is owned
    /// by migrations, not by a per-run drop-and-recreate.
    written_ids: Vec<i32>,
}

impl RegistryBuilder {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            stack: Vec::new(),
            written_ids: Vec::new(),
        }
    }

    pub fn current_path(&self) -> Result<Option<KbPath>, KbError> {
        if self.stack.is_empty() {
            return Ok(None);
        }
        Ok(Some(KbPath::from_labels(self.stack.clone())))
    }

    /// Push `(link, name)` onto the path stack and write one registry row
    /// at the resulting path. Does not pop — use [`RegistryBuilder::leave`]
    /// to descend back out, or [`RegistryBuilder::add_info`] for a leaf
    /// that pops immediately.
    pub async fn add_header(
        &mut self,
        link: RegistryKind,
        name: &str,
        properties: Value,
        data: Value,
    ) -> Result<(), KbError> {
        let mut candidate = self.stack.clone();
        candidate.push(link.to_string());
        candidate.push(name.to_string());
        let path: KbPath = candidate.join(".").parse()?;

        if link.requires_queue_depth()
            && !matches!(properties.get("queue_depth").and_then(Value::as_i64), Some(n) if n >= 0)
        {
            return Err(KbError::Validation(format!(
                "{link} entry {path} must declare a non-negative integer properties.queue_depth"
            )));
        }

        self.stack = candidate;

        let row = sqlx::query(
            "INSERT INTO knowledge_base.knowledge_base (kind, name, properties, data, path) \
             VALUES ($1, $2, $3, $4, $5::ltree) RETURNING id",
        )
        .bind(link.to_string())
        .bind(name)
        .bind(&properties)
        .bind(&data)
        .bind(path.to_string())
        .fetch_one(&self.pool)
        .await;

        let row = match row {
            Ok(row) => row,
            Err(e) => {
                self.stack.pop();
                self.stack.pop();
                return Err(duplicate_path_or_store_error(e, &path));
            }
        };

        let id: i32 = sqlx::Row::try_get(&row, "id")?;
        self.written_ids.push(id);
        info!(%path, %link, "registered endpoint");
        Ok(())
    }

    /// Write a leaf entry: push, insert, then immediately pop both
    /// segments back off the stack.
    pub async fn add_info(
        &mut self,
        link: RegistryKind,
        name: &str,
        properties: Value,
        data: Value,
    ) -> Result<(), KbError> {
        self.add_header(link, name, properties, data).await?;
        self.stack.pop();
        self.stack.pop();
        Ok(())
    }

    /// Pop `(link, name)` off the path stack, asserting it matches the most
    /// recent `add_header` call. Fatal (returns `InstallationFailed`) if the
    /// stack is empty or the top two segments don't match.
    pub fn leave(&mut self, link: RegistryKind, name: &str) -> Result<(), KbError> {
        let ref_name = self.stack.pop().ok_or_else(|| {
            KbError::InstallationFailed("cannot leave a header node: path is empty".into())
        })?;
        let ref_link = match self.stack.pop() {
            Some(v) => v,
            None => {
                self.stack.push(ref_name);
                return Err(KbError::InstallationFailed(
                    "cannot leave a header node: not enough elements in path".into(),
                ));
            }
        };

        if ref_name != name || ref_link != link.to_string() {
            let msg = format!(
                "leave({link}, {name}) does not match pushed ({ref_link}, {ref_name})"
            );
            self.stack.push(ref_link);
            self.stack.push(ref_name);
            return Err(KbError::InstallationFailed(msg));
        }
        Ok(())
    }

    /// Assert the path stack is empty. On failure, deletes every row this
    /// builder session wrote and returns `InstallationFailed` — callers can
    /// branch on this error kind rather than a bare store error.
    pub async fn check_installation(&mut self) -> Result<(), KbError> {
        if self.stack.is_empty() {
            info!("installation check passed: path stack empty");
            return Ok(());
        }

        warn!(stack = ?self.stack, "installation check failed: path stack not empty");
        if !self.written_ids.is_empty() {
            sqlx::query("DELETE FROM knowledge_base.knowledge_base WHERE id = ANY($1)")
                .bind(&self.written_ids)
                .execute(&self.pool)
                .await?;
        }
        let stack = std::mem::take(&mut self.stack);
        Err(KbError::InstallationFailed(format!(
            "path stack not empty at check_installation: {stack:?}"
        )))
    }
}

fn duplicate_path_or_store_error(err: sqlx::Error, path: &KbPath) -> KbError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            return KbError::InstallationFailed(format!("path {path} already exists in registry"));
        }
    }
    KbError::Store(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack_of(builder: &RegistryBuilder) -> &[String] {
        &builder.stack
    }

    #[tokio::test]
    async fn leave_rejects_mismatched_name() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping leave_rejects_mismatched_name: no database configured");
            return;
        };
        let mut builder = RegistryBuilder::new(pool);
        builder
            .add_header(RegistryKind::Header, "root", serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();
        let err = builder.leave(RegistryKind::Header, "not_root").unwrap_err();
        assert!(matches!(err, KbError::InstallationFailed(_)));
        assert_eq!(stack_of(&builder).len(), 2, "mismatched leave must not pop the stack");
    }

    #[tokio::test]
    async fn add_header_rejects_negative_queue_depth() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping add_header_rejects_negative_queue_depth: no database configured");
            return;
        };
        let mut builder = RegistryBuilder::new(pool);
        let err = builder
            .add_header(
                RegistryKind::Job,
                "negative_depth",
                serde_json::json!({"queue_depth": -1}),
                serde_json::json!({}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Validation(_)));
    }

    #[tokio::test]
    async fn leave_on_empty_stack_is_installation_failure() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping leave_on_empty_stack_is_installation_failure: no database configured");
            return;
        };
        let mut builder = RegistryBuilder::new(pool);
        let err = builder.leave(RegistryKind::Header, "root").unwrap_err();
        assert!(matches!(err, KbError::InstallationFailed(_)));
    }

    #[tokio::test]
    async fn check_installation_fails_on_unbalanced_stack() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping check_installation_fails_on_unbalanced_stack: no database configured");
            return;
        };
        let mut builder = RegistryBuilder::new(pool);
        builder
            .add_header(
                RegistryKind::Status,
                "widget",
                serde_json::json!({}),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        let err = builder.check_installation().await.unwrap_err();
        assert!(matches!(err, KbError::InstallationFailed(_)));
    }

    #[tokio::test]
    async fn balanced_push_and_pop_round_trips() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping balanced_push_and_pop_round_trips: no database configured");
            return;
        };
        let mut builder = RegistryBuilder::new(pool);
        builder
            .add_header(RegistryKind::Header, "root", serde_json::json!({}), serde_json::json!({}))
            .await
            .unwrap();
        builder
            .add_info(
                RegistryKind::Job,
                "queue_a",
                serde_json::json!({"queue_depth": 4}),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        builder.leave(RegistryKind::Header, "root").unwrap();
        builder.check_installation().await.unwrap();
    }
}
