use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{DatabaseContext, StorageResult};

/// Index definitions for one table: index name to ordered field list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub indexes: HashMap<String, Vec<String>>,
}

impl TableSchema {
    pub fn index_fields(&self, index: &str) -> Option<&[String]> {
        self.indexes.get(index).map(Vec::as_slice)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub tables: HashMap<String, TableSchema>,
}

impl SchemaInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn index_fields(&self, table: &str, index: &str) -> Option<&[String]> {
        self.table(table).and_then(|t| t.index_fields(index))
    }

    /// Builder-style registration, mostly for tests and hosts that know their
    /// schema up front.
    pub fn with_table(mut self, name: impl Into<String>) -> Self {
        self.tables.entry(name.into()).or_default();
        self
    }

    pub fn with_index(
        mut self,
        table: impl Into<String>,
        index: impl Into<String>,
        fields: &[&str],
    ) -> Self {
        self.tables
            .entry(table.into())
            .or_default()
            .indexes
            .insert(index.into(), fields.iter().map(|f| f.to_string()).collect());
        self
    }
}

/// Schema fetched at most once per engine.
///
/// Concurrent first callers share a single fetch. A failed fetch leaves the
/// cache empty so the next query retries.
#[derive(Debug, Default)]
pub struct SchemaCache {
    cell: OnceCell<Arc<SchemaInfo>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache seeded with a known schema; the database is never asked.
    pub fn preloaded(schema: SchemaInfo) -> Self {
        Self {
            cell: OnceCell::new_with(Some(Arc::new(schema))),
        }
    }

    pub async fn get<D>(&self, db: &D) -> StorageResult<Arc<SchemaInfo>>
    where
        D: DatabaseContext + ?Sized,
    {
        let schema = self
            .cell
            .get_or_try_init(|| async {
                let schema = db.schema().await?;
                debug!(tables = schema.tables.len(), "Loaded schema");
                Ok::<_, super::StorageError>(Arc::new(schema))
            })
            .await?;
        Ok(Arc::clone(schema))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDatabase;

    #[test]
    fn test_schema_builder() {
        let schema = SchemaInfo::new()
            .with_table("settings")
            .with_index("users", "by_status_age", &["status", "age"]);

        assert!(schema.has_table("settings"));
        assert!(schema.has_table("users"));
        assert_eq!(
            schema.index_fields("users", "by_status_age"),
            Some(&["status".to_string(), "age".to_string()][..])
        );
        assert_eq!(schema.index_fields("users", "missing"), None);
    }

    #[tokio::test]
    async fn test_cache_fetches_once() {
        let db = InMemoryDatabase::new();
        db.create_table("users");
        let cache = SchemaCache::new();
        assert!(!cache.is_loaded());

        let first = cache.get(&db).await.unwrap();
        assert!(first.has_table("users"));

        // Later tables are invisible until a new engine is built.
        db.create_table("posts");
        let second = cache.get(&db).await.unwrap();
        assert!(!second.has_table("posts"));
        assert!(cache.is_loaded());
    }

    #[tokio::test]
    async fn test_preloaded_cache_skips_database() {
        let db = InMemoryDatabase::new();
        let cache = SchemaCache::preloaded(SchemaInfo::new().with_table("orders"));
        let schema = cache.get(&db).await.unwrap();
        assert!(schema.has_table("orders"));
    }
}
