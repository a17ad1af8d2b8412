use kb_core::{KbError, KbPath};
use serde_json::Value;
use sqlx::{postgres::PgRow, Row};

use crate::kind::RegistryKind;

/// One row of the registry table `knowledge_base.knowledge_base`.
///
/// Queries selecting this type must cast the `path` column with
/// `path::text` — `KbPath`'s `sqlx` impl decodes through `String`, not
/// through the `ltree` wire format.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub id: i32,
    pub kind: RegistryKind,
    pub name: String,
    pub properties: Value,
    pub data: Value,
    pub path: KbPath,
}

impl RegistryEntry {
    /// Decode a row selected with `path::text AS path` (and `kind`, `id`,
    /// `name`, `properties`, `data` columns) into a [`RegistryEntry`].
    pub fn from_row(row: &PgRow) -> Result<Self, KbError> {
        let kind_str: String = row.try_get("kind")?;
        let path_str: String = row.try_get("path")?;
        Ok(RegistryEntry {
            id: row.try_get("id")?,
            kind: kind_str.parse()?,
            name: row.try_get("name")?,
            properties: row.try_get("properties")?,
            data: row.try_get("data")?,
            path: path_str.parse()?,
        })
    }

    /// Read `properties.queue_depth`, required to be a non-negative
    /// integer on every satellite kind.
    pub fn queue_depth(&self) -> Result<i64, KbError> {
        let depth = self
            .properties
            .get("queue_depth")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                KbError::Validation(format!(
                    "registry entry {:?} is missing integer properties.queue_depth",
                    self.path
                ))
            })?;
        if depth < 0 {
            return Err(KbError::Validation(format!(
                "registry entry {:?} has negative queue_depth {depth}",
                self.path
            )));
        }
        Ok(depth)
    }

    pub fn description(&self) -> Option<&str> {
        self.properties.get("description").and_then(Value::as_str)
    }
}
