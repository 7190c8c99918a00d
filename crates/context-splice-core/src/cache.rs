//! Persistent embedding cache keyed by file path.
//!
//! Each entry remembers the [`content_hash`](crate::hash::content_hash) its
//! vector was computed from; a file only needs re-embedding when its current
//! hash differs. The whole cache is serialized as one JSON value under
//! `"{namespace}/embedding-cache"` in a [`KeyValueStore`].
//!
//! # Lifecycle
//!
//! The cache has no hidden state: callers [`load`](EmbeddingCache::load) a
//! snapshot, mutate it, and [`save`](EmbeddingCache::save) it back. Loading
//! never fails: a missing, unreadable or corrupt value is an empty cache,
//! which only costs a full re-embed.
//!
//! Concurrent load/save cycles on the same namespace are not coordinated;
//! the last writer wins and the loser's entries are re-embedded next run.

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{namespaced_key, KeyValueStore};

const CACHE_KEY: &str = "embedding-cache";

/// A cached vector and the content hash it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedding: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct PersistedCache {
    model: String,
    saved_at: DateTime<Utc>,
    entries: BTreeMap<String, CacheEntry>,
}

/// In-memory snapshot of a workspace's embedding cache.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingCache {
    model: String,
    entries: BTreeMap<String, CacheEntry>,
}

impl EmbeddingCache {
    /// An empty cache for vectors produced by `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache for `namespace`.
    ///
    /// Entries persisted by a different model are discarded, since their
    /// vectors are not comparable with the current model's.
    pub async fn load(store: &dyn KeyValueStore, namespace: &str, model: &str) -> Self {
        let key = namespaced_key(namespace, CACHE_KEY);

        let raw = match store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(model),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "could not read embedding cache; starting empty");
                return Self::new(model);
            }
        };

        match serde_json::from_str::<PersistedCache>(&raw) {
            Ok(persisted) if persisted.model == model => Self {
                model: persisted.model,
                entries: persisted.entries,
            },
            Ok(persisted) => {
                tracing::info!(
                    namespace,
                    cached_model = %persisted.model,
                    model,
                    "embedding model changed; discarding cache"
                );
                Self::new(model)
            }
            Err(e) => {
                tracing::warn!(namespace, error = %e, "corrupt embedding cache; starting empty");
                Self::new(model)
            }
        }
    }

    /// Persist the cache for `namespace`.
    pub async fn save(&self, store: &dyn KeyValueStore, namespace: &str) -> Result<()> {
        let persisted = PersistedCache {
            model: self.model.clone(),
            saved_at: Utc::now(),
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string(&persisted)?;
        store.set(&namespaced_key(namespace, CACHE_KEY), &json).await
    }

    /// Delete the persisted cache for `namespace`.
    pub async fn clear(store: &dyn KeyValueStore, namespace: &str) -> Result<()> {
        store.delete(&namespaced_key(namespace, CACHE_KEY)).await
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// True when `path` has a vector computed from content hashing to `hash`.
    pub fn is_fresh(&self, path: &str, hash: &str) -> bool {
        self.entries
            .get(path)
            .is_some_and(|entry| entry.content_hash == hash)
    }

    pub fn insert(&mut self, path: impl Into<String>, content_hash: impl Into<String>, embedding: Vec<f32>) {
        self.entries.insert(
            path.into(),
            CacheEntry {
                content_hash: content_hash.into(),
                embedding,
            },
        );
    }

    /// Drop entries whose path is not in `keep`. Returns how many were dropped.
    pub fn retain_paths(&mut self, keep: &HashSet<&str>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| keep.contains(path.as_str()));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
