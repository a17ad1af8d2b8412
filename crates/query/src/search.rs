use kb_core::KbError;
use kb_registry::RegistryEntry;
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};

/// One accumulated search predicate, applied in the order it was added.
/// Grounded on `original_source/kb_python/kb_basic/data_structures/kb_query_support.py`'s
/// progressive-CTE filter chain, expressed here as a single dynamically
/// built `WHERE ... AND ...` query via [`sqlx::QueryBuilder`] rather than a
/// chain of CTEs — same semantics, no per-filter round trip.
enum Filter {
    Label(String),
    Name(String),
    PropertyKey(String),
    PropertyValue(String, Value),
    Path(String),
}

/// A reusable, chainable search over the registry table. Filters accumulate
/// until [`Self::execute`] is called; [`Self::clear_filters`] resets the
/// search to start over.
pub struct RegistryQuery {
    pool: PgPool,
    filters: Vec<Filter>,
}

impl RegistryQuery {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, filters: Vec::new() }
    }

    pub fn clear_filters(&mut self) -> &mut Self {
        self.filters.clear();
        self
    }

    pub fn search_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.filters.push(Filter::Label(label.into()));
        self
    }

    pub fn search_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.filters.push(Filter::Name(name.into()));
        self
    }

    pub fn search_property_key(&mut self, key: impl Into<String>) -> &mut Self {
        self.filters.push(Filter::PropertyKey(key.into()));
        self
    }

    pub fn search_property_value(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.filters.push(Filter::PropertyValue(key.into(), value));
        self
    }

    /// Match an `ltree` path expression, e.g. `"docs.*"` or `"*.technical.*"`.
    pub fn search_path(&mut self, path_expression: impl Into<String>) -> &mut Self {
        self.filters.push(Filter::Path(path_expression.into()));
        self
    }

    /// Run the accumulated filters and return every matching registry row.
    /// `path` is always selected as `path::text` so it round-trips through
    /// [`RegistryEntry`]'s `KbPath` field.
    pub async fn execute(&self) -> Result<Vec<RegistryEntry>, KbError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, kind, name, properties, data, path::text AS path FROM knowledge_base.knowledge_base",
        );

        for (i, filter) in self.filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match filter {
                Filter::Label(label) => {
                    qb.push("kind = ").push_bind(label.clone());
                }
                Filter::Name(name) => {
                    qb.push("name = ").push_bind(name.clone());
                }
                Filter::PropertyKey(key) => {
                    qb.push("properties ? ").push_bind(key.clone());
                }
                Filter::PropertyValue(key, value) => {
                    let object = serde_json::json!({ key: value });
                    qb.push("properties @> ").push_bind(object);
                }
                Filter::Path(path_expr) => {
                    qb.push("path ~ ").push_bind(path_expr.clone());
                    qb.push("::lquery");
                }
            }
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(RegistryEntry::from_row).collect()
    }
}
