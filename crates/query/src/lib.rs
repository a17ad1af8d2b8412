pub mod search;

pub use search::RegistryQuery;

use std::collections::HashMap;

use kb_core::{KbError, KbPath};
use kb_registry::RegistryEntry;
use serde_json::Value;
use sqlx::{PgPool, Row};

/// Pull `properties.description` out of each entry, keyed by name. Entries
/// with no `description` property map to an empty string.
pub fn find_description(entries: &[RegistryEntry]) -> Vec<(String, String)> {
    entries
        .iter()
        .map(|entry| (entry.name.clone(), entry.description().unwrap_or("").to_string()))
        .collect()
}

/// Look up the `data` column for each of `paths`, by exact path match.
/// Paths with no matching row map to `None`.
pub async fn find_description_paths(
    pool: &PgPool,
    paths: &[KbPath],
) -> Result<HashMap<String, Option<Value>>, KbError> {
    let mut out = HashMap::with_capacity(paths.len());
    for path in paths {
        let row = sqlx::query("SELECT data FROM knowledge_base.knowledge_base WHERE path = $1::ltree")
            .bind(path.to_string())
            .fetch_optional(pool)
            .await?;
        let data = match row {
            Some(row) => Some(row.try_get::<Value, _>("data")?),
            None => None,
        };
        out.insert(path.to_string(), data);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_by_label_and_property_narrows_results() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping search_by_label_and_property_narrows_results: no database configured");
            return;
        };

        let mut builder = kb_registry::RegistryBuilder::new(pool.clone());
        builder
            .add_info(
                kb_registry::RegistryKind::Job,
                "query_test_job",
                serde_json::json!({"queue_depth": 1, "region": "us-east"}),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        builder.check_installation().await.unwrap();

        let mut query = RegistryQuery::new(pool.clone());
        query
            .search_label("KB_JOB_QUEUE")
            .search_property_value("region", serde_json::json!("us-east"));
        let results = query.execute().await.unwrap();
        assert!(results.iter().any(|e| e.name == "query_test_job"));

        query.clear_filters();
        query.search_property_value("region", serde_json::json!("eu-west"));
        let results = query.execute().await.unwrap();
        assert!(!results.iter().any(|e| e.name == "query_test_job"));
    }

    #[tokio::test]
    async fn find_description_paths_reports_missing_as_none() {
        let Some(pool) = kb_core::pool::connect_for_tests().await else {
            eprintln!("skipping find_description_paths_reports_missing_as_none: no database configured");
            return;
        };

        let missing: KbPath = "query_test.never_registered".parse().unwrap();
        let result = find_description_paths(&pool, &[missing.clone()]).await.unwrap();
        assert_eq!(result.get(&missing.to_string()).unwrap(), &None);
    }
}
