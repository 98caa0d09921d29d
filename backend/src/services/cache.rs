use crate::models::{ChannelSnapshot, VideoSnapshot};
use crate::services::store::{
    doc_id, get_doc, put_doc, DocumentStore, CHANNEL_CACHE_INDEX, VIDEO_CACHE_INDEX,
};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub user_id: String,
    pub channel_id: String,
}

impl CacheKey {
    pub fn new(user_id: &str, channel_id: &str) -> Self {
        CacheKey {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
        }
    }

    fn id(&self) -> String {
        doc_id(&[&self.user_id, &self.channel_id])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
    pub age: Duration,
}

impl<T> Cached<T> {
    pub fn is_fresh(&self, window: Duration) -> bool {
        self.age <= window
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry<T> {
    user_id: String,
    channel_id: String,
    stored_at: DateTime<Utc>,
    value: T,
}

/// One cached value per (user, channel), replaced wholesale on every write.
pub struct SnapshotCache<'a, T> {
    store: &'a dyn DocumentStore,
    index: &'static str,
    _value: PhantomData<T>,
}

impl<'a> SnapshotCache<'a, ChannelSnapshot> {
    pub fn channels(store: &'a dyn DocumentStore) -> Self {
        SnapshotCache {
            store,
            index: CHANNEL_CACHE_INDEX,
            _value: PhantomData,
        }
    }
}

impl<'a> SnapshotCache<'a, Vec<VideoSnapshot>> {
    pub fn videos(store: &'a dyn DocumentStore) -> Self {
        SnapshotCache {
            store,
            index: VIDEO_CACHE_INDEX,
            _value: PhantomData,
        }
    }
}

impl<'a, T: Serialize + DeserializeOwned> SnapshotCache<'a, T> {
    pub async fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Result<Option<Cached<T>>> {
        let entry: Option<CacheEntry<T>> = get_doc(self.store, self.index, &key.id()).await?;
        Ok(entry.map(|entry| Cached {
            age: now - entry.stored_at,
            stored_at: entry.stored_at,
            value: entry.value,
        }))
    }

    pub async fn set(&self, key: &CacheKey, value: &T, now: DateTime<Utc>) -> Result<()> {
        let entry = CacheEntry {
            user_id: key.user_id.clone(),
            channel_id: key.channel_id.clone(),
            stored_at: now,
            value,
        };
        put_doc(self.store, self.index, &key.id(), &entry).await
    }
}
