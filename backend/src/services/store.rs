use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const CHANNEL_CACHE_INDEX: &str = "channel_cache";
pub const VIDEO_CACHE_INDEX: &str = "video_cache";
pub const DAILY_STATS_INDEX: &str = "daily_stats";
pub const QUOTA_USAGE_INDEX: &str = "quota_usage";
pub const MILESTONES_INDEX: &str = "milestones";
pub const TASKS_INDEX: &str = "tasks";
pub const USER_STATS_INDEX: &str = "user_stats";
pub const USER_GOALS_INDEX: &str = "user_goals";
pub const VIDEO_IDEAS_INDEX: &str = "video_ideas";
pub const USER_SETTINGS_INDEX: &str = "user_settings";
pub const ACHIEVEMENTS_INDEX: &str = "achievements";

pub const ALL_INDICES: &[&str] = &[
    CHANNEL_CACHE_INDEX,
    VIDEO_CACHE_INDEX,
    DAILY_STATS_INDEX,
    QUOTA_USAGE_INDEX,
    MILESTONES_INDEX,
    TASKS_INDEX,
    USER_STATS_INDEX,
    USER_GOALS_INDEX,
    VIDEO_IDEAS_INDEX,
    USER_SETTINGS_INDEX,
    ACHIEVEMENTS_INDEX,
];

/// JSON documents grouped into named indices. Every write is a single
/// document; there are no multi-document transactions.
#[rocket::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>>;

    async fn put(&self, index: &str, id: &str, doc: Value) -> Result<()>;

    /// Inserts only if `id` is unused. Returns whether the document was written.
    async fn create(&self, index: &str, id: &str, doc: Value) -> Result<bool>;

    async fn delete(&self, index: &str, id: &str) -> Result<bool>;

    /// Documents whose keyword fields equal every given value.
    async fn find(&self, index: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>>;

    /// Adds `deltas` to integer fields, starting from `seed` when the document is missing.
    async fn increment(
        &self,
        index: &str,
        id: &str,
        deltas: &[(&str, i64)],
        seed: Value,
    ) -> Result<()>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

pub fn doc_id(parts: &[&str]) -> String {
    parts.join(":")
}

pub async fn get_doc<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    index: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(index, id).await? {
        Some(source) => {
            let doc = serde_json::from_value(source)
                .with_context(|| format!("Malformed document {index}/{id}"))?;
            Ok(Some(doc))
        }
        None => Ok(None),
    }
}

pub async fn put_doc<T: Serialize>(
    store: &dyn DocumentStore,
    index: &str,
    id: &str,
    doc: &T,
) -> Result<()> {
    store.put(index, id, serde_json::to_value(doc)?).await
}

pub async fn create_doc<T: Serialize>(
    store: &dyn DocumentStore,
    index: &str,
    id: &str,
    doc: &T,
) -> Result<bool> {
    store.create(index, id, serde_json::to_value(doc)?).await
}

pub async fn find_docs<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    index: &str,
    filters: &[(&str, &str)],
) -> Result<Vec<T>> {
    let mut docs = Vec::new();
    for source in store.find(index, filters).await? {
        match serde_json::from_value::<T>(source) {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!("Skipping malformed document in {index}: {e}"),
        }
    }
    Ok(docs)
}

/// In-process store, used for tests and `STORAGE_BACKEND=memory`.
#[derive(Default)]
pub struct MemoryStore {
    indices: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filters(doc: &Value, filters: &[(&str, &str)]) -> bool {
    filters
        .iter()
        .all(|(field, value)| doc.get(*field).and_then(Value::as_str) == Some(*value))
}

#[rocket::async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let indices = self.indices.read().await;
        Ok(indices.get(index).and_then(|docs| docs.get(id)).cloned())
    }

    async fn put(&self, index: &str, id: &str, doc: Value) -> Result<()> {
        let mut indices = self.indices.write().await;
        indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), doc);
        Ok(())
    }

    async fn create(&self, index: &str, id: &str, doc: Value) -> Result<bool> {
        let mut indices = self.indices.write().await;
        let docs = indices.entry(index.to_string()).or_default();
        if docs.contains_key(id) {
            return Ok(false);
        }
        docs.insert(id.to_string(), doc);
        Ok(true)
    }

    async fn delete(&self, index: &str, id: &str) -> Result<bool> {
        let mut indices = self.indices.write().await;
        Ok(indices
            .get_mut(index)
            .map(|docs| docs.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn find(&self, index: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
        let indices = self.indices.read().await;
        Ok(indices
            .get(index)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches_filters(doc, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn increment(
        &self,
        index: &str,
        id: &str,
        deltas: &[(&str, i64)],
        seed: Value,
    ) -> Result<()> {
        let mut indices = self.indices.write().await;
        let doc = indices
            .entry(index.to_string())
            .or_default()
            .entry(id.to_string())
            .or_insert(seed);
        let fields = doc
            .as_object_mut()
            .with_context(|| format!("Document {index}/{id} is not an object"))?;
        for (field, delta) in deltas {
            let current = fields.get(*field).and_then(Value::as_i64).unwrap_or(0);
            fields.insert(field.to_string(), Value::from(current + delta));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_does_not_overwrite() {
        let store = MemoryStore::new();
        assert!(store.create("m", "a", json!({"v": 1})).await.unwrap());
        assert!(!store.create("m", "a", json!({"v": 2})).await.unwrap());
        assert_eq!(store.get("m", "a").await.unwrap(), Some(json!({"v": 1})));
    }

    #[tokio::test]
    async fn increment_is_additive_from_seed() {
        let store = MemoryStore::new();
        let seed = json!({"user_id": "u", "quota_used": 0, "calls_made": 0});
        store
            .increment("q", "u", &[("quota_used", 5), ("calls_made", 1)], seed.clone())
            .await
            .unwrap();
        store
            .increment("q", "u", &[("quota_used", 100), ("calls_made", 1)], seed)
            .await
            .unwrap();
        let doc = store.get("q", "u").await.unwrap().unwrap();
        assert_eq!(doc["quota_used"], 105);
        assert_eq!(doc["calls_made"], 2);
    }

    #[tokio::test]
    async fn find_applies_every_filter() {
        let store = MemoryStore::new();
        store
            .put("t", "1", json!({"user_id": "a", "channel_id": "x"}))
            .await
            .unwrap();
        store
            .put("t", "2", json!({"user_id": "a", "channel_id": "y"}))
            .await
            .unwrap();
        store
            .put("t", "3", json!({"user_id": "b", "channel_id": "x"}))
            .await
            .unwrap();

        let hits = store
            .find("t", &[("user_id", "a"), ("channel_id", "x")])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(store.find("t", &[("user_id", "a")]).await.unwrap().len(), 2);
        assert!(store.find("missing", &[]).await.unwrap().is_empty());
        assert!(store.delete("t", "1").await.unwrap());
        assert!(!store.delete("t", "1").await.unwrap());
    }
}
