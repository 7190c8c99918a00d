//! Candidate files for nearest-file retrieval.

use anyhow::Result;
use async_trait::async_trait;

use crate::hash::content_hash;

/// A source file with the hash of its current content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Workspace-relative path; also the cache key.
    pub path: String,
    pub content: String,
    /// [`content_hash`] of `content`.
    pub content_hash: String,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let content_hash = content_hash(&content);
        Self {
            path: path.into(),
            content,
            content_hash,
        }
    }
}

/// Enumerates candidate files and their current content on demand.
///
/// The enumeration order is significant: it breaks ties between files at
/// equal distance from a query.
#[async_trait]
pub trait CorpusProvider: Send + Sync {
    async fn files(&self) -> Result<Vec<FileRecord>>;
}

#[async_trait]
impl CorpusProvider for Vec<FileRecord> {
    async fn files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.clone())
    }
}
