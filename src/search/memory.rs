//! In-process search backend.
//!
//! Documents are kept per index in ID order. A document matches a query
//! when any string inside it contains the query, ignoring case. The empty
//! query matches everything.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Result, SearchBackend};

type Documents = BTreeMap<String, Value>;

/// In-memory search backend. Clones share storage.
#[derive(Clone, Default)]
pub struct MemorySearch {
    indexes: Arc<RwLock<HashMap<String, Documents>>>,
}

impl MemorySearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored document, if any.
    pub async fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.indexes
            .read()
            .await
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in `index`.
    pub async fn len(&self, index: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .map_or(0, BTreeMap::len)
    }
}

fn contains_text(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| contains_text(v, needle)),
        Value::Object(fields) => fields.values().any(|v| contains_text(v, needle)),
        _ => false,
    }
}

#[async_trait]
impl SearchBackend for MemorySearch {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, index: &str, id: &str, document: Value) -> Result<()> {
        self.indexes
            .write()
            .await
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> Result<()> {
        if let Some(docs) = self.indexes.write().await.get_mut(index) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn search(&self, index: &str, query: &str) -> Result<Vec<Value>> {
        let needle = query.trim().to_lowercase();
        let indexes = self.indexes.read().await;
        let Some(docs) = indexes.get(index) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .values()
            .filter(|doc| needle.is_empty() || contains_text(doc, &needle))
            .cloned()
            .collect())
    }

    async fn wipe(&self, index: &str) -> Result<()> {
        self.indexes.write().await.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_upsert_replaces() {
        let search = MemorySearch::new();
        search.upsert("recipes", "r1", json!({"name": "Soup"})).await.unwrap();
        search.upsert("recipes", "r1", json!({"name": "Stew"})).await.unwrap();

        assert_eq!(search.len("recipes").await, 1);
        assert_eq!(
            search.document("recipes", "r1").await,
            Some(json!({"name": "Stew"}))
        );
    }

    #[tokio::test]
    async fn test_search_matches_nested_strings_case_insensitively() {
        let search = MemorySearch::new();
        search
            .upsert(
                "recipes",
                "r1",
                json!({"name": "Soup", "steps": [{"ingredients": [{"name": "Water"}]}]}),
            )
            .await
            .unwrap();
        search
            .upsert("recipes", "r2", json!({"name": "Bread"}))
            .await
            .unwrap();

        let hits = search.search("recipes", "WATER").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], "Soup");
        assert_eq!(search.search("recipes", "").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_indexes_are_isolated() {
        let search = MemorySearch::new();
        search.upsert("recipes", "x", json!({"name": "a"})).await.unwrap();
        search.upsert("meals", "x", json!({"name": "b"})).await.unwrap();

        search.wipe("recipes").await.unwrap();

        assert_eq!(search.len("recipes").await, 0);
        assert_eq!(search.len("meals").await, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let search = MemorySearch::new();
        search.delete("recipes", "nope").await.unwrap();
        search.upsert("recipes", "r1", json!({})).await.unwrap();
        search.delete("recipes", "r1").await.unwrap();
        search.delete("recipes", "r1").await.unwrap();
        assert_eq!(search.len("recipes").await, 0);
    }
}
