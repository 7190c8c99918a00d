//! Persistent key-value abstraction for Context Splice.
//!
//! The [`KeyValueStore`] trait is the only persistence the core needs: the
//! embedding cache is serialized to a single string value per workspace.
//! Keys are namespaced per workspace with [`namespaced_key`] so caches of
//! different projects never collide.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;

/// Abstract string-to-string store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get`](KeyValueStore::get) | Read a value, `None` when absent |
/// | [`set`](KeyValueStore::set) | Insert or overwrite a value |
/// | [`delete`](KeyValueStore::delete) | Remove a value (no-op when absent) |
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Scope `key` to a workspace namespace.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    format!("{}/{}", namespace, key)
}
