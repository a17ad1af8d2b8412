pub mod builder;
pub mod entry;
pub mod kind;

pub use builder::RegistryBuilder;
pub use entry::RegistryEntry;
pub use kind::RegistryKind;

use kb_core::KbError;
use sqlx::PgPool;

/// All registry rows of a given kind, ordered by path. Used by the
/// reconciler to diff the declared registry against each satellite
/// table, and by the query crate to resolve descriptions and labels.
pub async fn list_by_kind(pool: &PgPool, kind: RegistryKind) -> Result<Vec<RegistryEntry>, KbError> {
    let rows = sqlx::query(
        "SELECT id, kind, name, properties, data, path::text AS path \
         FROM knowledge_base.knowledge_base \
         WHERE kind = $1 \
         ORDER BY path",
    )
    .bind(kind.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(RegistryEntry::from_row).collect()
}

/// Every registry row, ordered by path. Used by full-scan query
/// operations (label/name/property search) that need to walk the whole
/// tree rather than a single kind.
pub async fn list_all(pool: &PgPool) -> Result<Vec<RegistryEntry>, KbError> {
    let rows = sqlx::query(
        "SELECT id, kind, name, properties, data, path::text AS path \
         FROM knowledge_base.knowledge_base \
         ORDER BY path",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(RegistryEntry::from_row).collect()
}

/// Look up a single entry by its exact path, used when a satellite
/// handle needs to re-validate its own registration before serving a
/// request.
pub async fn find_by_path(pool: &PgPool, path: &kb_core::KbPath) -> Result<Option<RegistryEntry>, KbError> {
    let row = sqlx::query(
        "SELECT id, kind, name, properties, data, path::text AS path \
         FROM knowledge_base.knowledge_base \
         WHERE path = $1::ltree",
    )
    .bind(path.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(RegistryEntry::from_row).transpose()
}
